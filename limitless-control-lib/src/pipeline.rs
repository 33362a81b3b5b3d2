//! Replayable instruction lists for a group.
//!
//! A [`Pipeline`] is built once and then handed to
//! [`Group::enqueue`](crate::group::Group::enqueue). The group's worker
//! interprets the stages in order, checking for cancellation before every
//! stage, including each stage replayed by a `repeat`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::{check_unit, Error, Result};
use crate::group::{pause, Group, TransitionTarget};
use crate::led::color::RGB;
use crate::protocol::{CommandSet, Nudge, Operation};

/// A user supplied function run as a stage.
#[derive(Clone)]
pub struct Callback(Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>);

impl Callback {
    pub fn new<F>(function: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Callback(Arc::new(function))
    }

    fn call(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callback")
    }
}

#[derive(Debug, Clone)]
pub enum Stage {
    On,
    Off,
    Color(RGB),
    Brightness(f64),
    Hue(f64),
    Saturation(f64),
    Temperature(f64),
    White,
    NightLight,
    Nudge(Nudge),
    Link,
    Unlink,
    Transition {
        duration: Duration,
        target: TransitionTarget,
    },
    Flash(Duration),
    Wait(Duration),
    /// Replay the previous `stages` stages. `None` repeats until stopped.
    Repeat {
        iterations: Option<u32>,
        stages: usize,
    },
    Callback(Callback),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::On => "on",
            Stage::Off => "off",
            Stage::Color(_) => "color",
            Stage::Brightness(_) => "brightness",
            Stage::Hue(_) => "hue",
            Stage::Saturation(_) => "saturation",
            Stage::Temperature(_) => "temperature",
            Stage::White => "white",
            Stage::NightLight => "night_light",
            Stage::Nudge(nudge) => nudge.name(),
            Stage::Link => "link",
            Stage::Unlink => "unlink",
            Stage::Transition { .. } => "transition",
            Stage::Flash(_) => "flash",
            Stage::Wait(_) => "wait",
            Stage::Repeat { .. } => "repeat",
            Stage::Callback(_) => "callback",
        }
    }

    /// Operations the group must support for this stage to run.
    fn required_operations(&self) -> Vec<Operation> {
        match self {
            Stage::Color(_) => vec![Operation::Hue],
            Stage::Brightness(_) => vec![Operation::Brightness],
            Stage::Hue(_) => vec![Operation::Hue],
            Stage::Saturation(_) => vec![Operation::Saturation],
            Stage::Temperature(_) => vec![Operation::Temperature],
            Stage::White => vec![Operation::White],
            Stage::NightLight => vec![Operation::NightLight],
            Stage::Nudge(nudge) => vec![Operation::Nudge(*nudge)],
            Stage::Link | Stage::Unlink => vec![Operation::Link],
            Stage::Transition { target, .. } => {
                let mut operations = Vec::new();
                if target.color.is_some() {
                    operations.push(Operation::Hue);
                }
                if target.brightness.is_some() {
                    operations.push(Operation::Brightness);
                }
                if target.temperature.is_some() {
                    operations.push(Operation::Temperature);
                }
                operations
            }
            _ => Vec::new(),
        }
    }
}

/// Brightness and temperature can also be reached one nudge at a time.
fn reachable(commands: &CommandSet, operation: Operation) -> bool {
    let stepped = |down, up| {
        commands.supports(Operation::Nudge(down)) && commands.supports(Operation::Nudge(up))
    };
    commands.supports(operation)
        || match operation {
            Operation::Brightness => stepped(Nudge::Dimmer, Nudge::Brighter),
            Operation::Temperature => stepped(Nudge::Warmer, Nudge::Cooler),
            _ => false,
        }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Concatenate the stages of `other` onto this pipeline.
    pub fn append(mut self, other: &Pipeline) -> Self {
        self.stages.extend(other.stages.iter().cloned());
        self
    }

    pub fn on(self) -> Self {
        self.stage(Stage::On)
    }

    pub fn off(self) -> Self {
        self.stage(Stage::Off)
    }

    pub fn color(self, color: RGB) -> Self {
        self.stage(Stage::Color(color))
    }

    pub fn brightness(self, brightness: f64) -> Self {
        self.stage(Stage::Brightness(brightness))
    }

    pub fn hue(self, hue: f64) -> Self {
        self.stage(Stage::Hue(hue))
    }

    pub fn saturation(self, saturation: f64) -> Self {
        self.stage(Stage::Saturation(saturation))
    }

    pub fn temperature(self, temperature: f64) -> Self {
        self.stage(Stage::Temperature(temperature))
    }

    pub fn white(self) -> Self {
        self.stage(Stage::White)
    }

    pub fn night_light(self) -> Self {
        self.stage(Stage::NightLight)
    }

    pub fn nudge(self, nudge: Nudge) -> Self {
        self.stage(Stage::Nudge(nudge))
    }

    pub fn link(self) -> Self {
        self.stage(Stage::Link)
    }

    pub fn unlink(self) -> Self {
        self.stage(Stage::Unlink)
    }

    pub fn transition(self, duration: Duration, target: TransitionTarget) -> Self {
        self.stage(Stage::Transition { duration, target })
    }

    pub fn flash(self, duration: Duration) -> Self {
        self.stage(Stage::Flash(duration))
    }

    pub fn wait(self, duration: Duration) -> Self {
        self.stage(Stage::Wait(duration))
    }

    /// Replay the previous `stages` stages, `iterations` times in total
    /// counting the first pass, or forever with `None`.
    pub fn repeat(self, iterations: Option<u32>, stages: usize) -> Self {
        self.stage(Stage::Repeat { iterations, stages })
    }

    pub fn callback<F>(self, function: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.stage(Stage::Callback(Callback::new(function)))
    }

    /// Check every stage against what `commands` can do.
    pub fn validate(&self, commands: &CommandSet) -> Result<()> {
        for (index, stage) in self.stages.iter().enumerate() {
            match stage {
                Stage::Brightness(v) => {
                    check_unit("brightness", *v)?;
                }
                Stage::Hue(v) => {
                    check_unit("hue", *v)?;
                }
                Stage::Saturation(v) => {
                    check_unit("saturation", *v)?;
                }
                Stage::Temperature(v) => {
                    check_unit("temperature", *v)?;
                }
                Stage::Transition { target, .. } => target.validate()?,
                Stage::Repeat { iterations, stages } => {
                    if *stages == 0 || *stages > index {
                        return Err(Error::InvalidPipeline(format!(
                            "stage {index} repeats {stages} stages but {index} precede it"
                        )));
                    }
                    if *iterations == Some(0) {
                        return Err(Error::InvalidPipeline(format!(
                            "stage {index} repeats zero times"
                        )));
                    }
                }
                _ => {}
            }
            for operation in stage.required_operations() {
                if !reachable(commands, operation) {
                    return Err(Error::Unsupported {
                        operation: operation.name(),
                        led_type: commands.led_type(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Execute against `group` until done or `cancel` fires. Only a failing
    /// callback ends execution with an error; other stage failures are
    /// logged and skipped.
    pub(crate) async fn run(&self, group: &Group, cancel: &CancellationToken) -> Result<()> {
        for index in 0..self.stages.len() {
            if cancel.is_cancelled() {
                break;
            }
            self.execute(index, group, cancel).await?;
        }
        Ok(())
    }

    fn execute<'a>(
        &'a self,
        index: usize,
        group: &'a Group,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let stage = &self.stages[index];
            group
                .link_observer()
                .stage_started(group.name(), stage.name());
            let outcome = match stage {
                Stage::On => group.turn_on().await,
                Stage::Off => group.turn_off().await,
                Stage::Color(color) => group.set_color(*color).await,
                Stage::Brightness(v) => group.set_brightness(*v).await,
                Stage::Hue(v) => group.set_hue(*v).await,
                Stage::Saturation(v) => group.set_saturation(*v).await,
                Stage::Temperature(v) => group.set_temperature(*v).await,
                Stage::White => group.white().await,
                Stage::NightLight => group.night_light().await,
                Stage::Nudge(nudge) => group.nudge(*nudge).await,
                Stage::Link => group.link().await,
                Stage::Unlink => group.unlink().await,
                Stage::Transition { duration, target } => {
                    group.transition_until(*duration, *target, cancel).await
                }
                Stage::Flash(duration) => group.flash_until(*duration, cancel).await,
                Stage::Wait(duration) => {
                    pause(*duration, cancel).await;
                    Ok(())
                }
                Stage::Repeat { iterations, stages } => {
                    return self.replay(index, *iterations, *stages, group, cancel).await;
                }
                Stage::Callback(callback) => {
                    return callback.call().map_err(Error::Callback);
                }
            };
            if let Err(err) = outcome {
                warn!(
                    "Stage {} on group {} failed: {}",
                    stage.name(),
                    group.name(),
                    err
                );
            }
            Ok(())
        })
    }

    async fn replay(
        &self,
        index: usize,
        iterations: Option<u32>,
        stages: usize,
        group: &Group,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let replays = iterations.map(|n| n.saturating_sub(1));
        let first = index.saturating_sub(stages);
        let mut done = 0;
        while replays.map_or(true, |n| done < n) {
            for replayed in first..index {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                self.execute(replayed, group, cancel).await?;
            }
            done += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LedType;

    fn rgbw() -> CommandSet {
        CommandSet::new(6, LedType::Rgbw, 1).unwrap()
    }

    #[test]
    fn test_builder_order() {
        let pipeline = Pipeline::new()
            .on()
            .color(RGB::RED)
            .wait(Duration::from_millis(10))
            .repeat(Some(2), 2);
        let names: Vec<_> = pipeline.stages().iter().map(Stage::name).collect();
        assert_eq!(names, vec!["on", "color", "wait", "repeat"]);
    }

    #[test]
    fn test_append() {
        let first = Pipeline::new().on();
        let second = Pipeline::new().brightness(0.2).off();
        let joined = first.append(&second);
        assert_eq!(joined.len(), 3);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn test_validate_repeat_bounds() {
        let commands = rgbw();
        assert!(Pipeline::new().on().repeat(None, 1).validate(&commands).is_ok());
        let err = Pipeline::new().on().repeat(None, 2).validate(&commands);
        assert!(matches!(err, Err(Error::InvalidPipeline(_))));
        let err = Pipeline::new().on().repeat(None, 0).validate(&commands);
        assert!(matches!(err, Err(Error::InvalidPipeline(_))));
        let err = Pipeline::new().on().repeat(Some(0), 1).validate(&commands);
        assert!(matches!(err, Err(Error::InvalidPipeline(_))));
    }

    #[test]
    fn test_validate_values() {
        let commands = rgbw();
        let err = Pipeline::new().brightness(1.5).validate(&commands);
        assert!(matches!(err, Err(Error::OutOfRange { .. })));
        let err = Pipeline::new()
            .transition(
                Duration::from_secs(1),
                TransitionTarget::default().color(RGB::RED).temperature(0.2),
            )
            .validate(&commands);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_capabilities() {
        let commands = rgbw();
        let err = Pipeline::new().saturation(0.5).validate(&commands);
        assert!(matches!(
            err,
            Err(Error::Unsupported {
                operation: "saturation",
                ..
            })
        ));
        let white = CommandSet::new(5, LedType::White, 1).unwrap();
        assert!(Pipeline::new().brightness(0.3).validate(&white).is_ok());
        assert!(Pipeline::new().nudge(Nudge::Cooler).validate(&white).is_ok());
        assert!(Pipeline::new().hue(0.3).validate(&white).is_err());
        assert!(Pipeline::new().temperature(0.2).validate(&white).is_ok());
    }

    #[test]
    fn test_validate_temperature_and_color() {
        let commands = rgbw();
        let err = Pipeline::new().temperature(0.5).validate(&commands);
        assert!(matches!(
            err,
            Err(Error::Unsupported {
                operation: "temperature",
                ..
            })
        ));
        let fade = Pipeline::new().transition(
            Duration::from_secs(1),
            TransitionTarget::default().temperature(0.8),
        );
        assert!(fade.validate(&commands).is_err());
        assert!(Pipeline::new().color(RGB::RED).validate(&commands).is_ok());

        let dimmer = CommandSet::new(6, LedType::Dimmer, 1).unwrap();
        let err = Pipeline::new().color(RGB::RED).validate(&dimmer);
        assert!(matches!(
            err,
            Err(Error::Unsupported {
                operation: "hue",
                ..
            })
        ));
        let fade = Pipeline::new().transition(
            Duration::from_secs(1),
            TransitionTarget::default().color(RGB::BLUE),
        );
        assert!(fade.validate(&dimmer).is_err());
        let dim = Pipeline::new().transition(
            Duration::from_secs(1),
            TransitionTarget::default().brightness(0.1),
        );
        assert!(dim.validate(&dimmer).is_ok());
    }

    #[test]
    fn test_callback_debug() {
        let pipeline = Pipeline::new().callback(|| Ok(()));
        assert_eq!(format!("{:?}", pipeline.stages()[0]), "Callback(Callback)");
    }
}
