//! Groups: the devices on one zone of a bridge.
//!
//! A [`Group`] tracks the last known state of its bulbs and turns property
//! changes into commands. Setters validate synchronously, hand the command
//! to the bridge serializer and update the cached state. Pipelines are
//! interpreted by a dedicated worker task, one pipeline at a time.

pub mod transition;

use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bridge::{Link, Observer, Rate};
use crate::error::{check_unit, Error, Result};
use crate::led::color::RGB;
use crate::pipeline::Pipeline;
use crate::protocol::{Command, CommandSet, LedType, Nudge, Operation};
use crate::util;
use transition::{Plan, Property, Track};

/// Last state sent to a group. Bulbs don't report back, so this is what the
/// library believes, not what was measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupState {
    pub on: bool,
    pub brightness: f64,
    pub hue: f64,
    pub saturation: f64,
    pub temperature: f64,
    pub color: RGB,
}

impl Default for GroupState {
    fn default() -> Self {
        GroupState {
            on: false,
            brightness: 0.5,
            hue: 0.0,
            saturation: 0.0,
            temperature: 0.5,
            color: RGB::WHITE,
        }
    }
}

/// Where a transition should end. Unset fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransitionTarget {
    pub color: Option<RGB>,
    pub brightness: Option<f64>,
    pub temperature: Option<f64>,
}

impl TransitionTarget {
    pub fn color(mut self, color: RGB) -> Self {
        self.color = Some(color);
        self
    }

    pub fn brightness(mut self, brightness: f64) -> Self {
        self.brightness = Some(brightness);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.color.is_some() && self.temperature.is_some() {
            return Err(Error::InvalidArgument(
                "cannot transition to a color and a temperature at once".to_string(),
            ));
        }
        if let Some(brightness) = self.brightness {
            check_unit("brightness", brightness)?;
        }
        if let Some(temperature) = self.temperature {
            check_unit("temperature", temperature)?;
        }
        Ok(())
    }
}

enum Job {
    Run(Pipeline),
    Barrier(oneshot::Sender<()>),
}

/// Handle to one group. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Group {
    inner: Arc<GroupInner>,
}

#[derive(Derivative)]
#[derivative(Debug)]
struct GroupInner {
    name: String,
    commands: CommandSet,
    link: Arc<Link>,
    state: Mutex<GroupState>,
    #[derivative(Debug = "ignore")]
    jobs: mpsc::UnboundedSender<Job>,
    current: Mutex<CancellationToken>,
}

impl Group {
    pub(crate) fn spawn(
        name: &str,
        commands: CommandSet,
        link: Arc<Link>,
    ) -> (Group, JoinHandle<()>) {
        let (jobs, queue) = mpsc::unbounded_channel();
        let current = link.shutdown().child_token();
        let group = Group {
            inner: Arc::new(GroupInner {
                name: name.to_string(),
                commands,
                link,
                state: Mutex::new(GroupState::default()),
                jobs,
                current: Mutex::new(current),
            }),
        };
        let worker = tokio::spawn(work(group.clone(), queue));
        (group, worker)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn zone(&self) -> u8 {
        self.inner.commands.zone()
    }

    pub fn led_type(&self) -> LedType {
        self.inner.commands.led_type()
    }

    pub fn command_set(&self) -> &CommandSet {
        &self.inner.commands
    }

    pub fn state(&self) -> GroupState {
        self.inner.state.lock().clone()
    }

    pub fn is_on(&self) -> bool {
        self.inner.state.lock().on
    }

    pub fn brightness(&self) -> f64 {
        self.inner.state.lock().brightness
    }

    pub fn hue(&self) -> f64 {
        self.inner.state.lock().hue
    }

    pub fn saturation(&self) -> f64 {
        self.inner.state.lock().saturation
    }

    pub fn temperature(&self) -> f64 {
        self.inner.state.lock().temperature
    }

    pub fn color(&self) -> RGB {
        self.inner.state.lock().color
    }

    pub(crate) fn link_observer(&self) -> &Arc<dyn Observer> {
        self.inner.link.observer()
    }

    fn default_rate(&self) -> Rate {
        self.inner.link.config().default_rate()
    }

    fn transition_rate(&self) -> Rate {
        Rate {
            wait: self.inner.link.config().transition_wait,
            reps: 1,
        }
    }

    async fn send(&self, command: Command, rate: Rate) -> Result<()> {
        self.inner.link.send(command, rate).await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_on(true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_on(false).await
    }

    pub async fn set_on(&self, on: bool) -> Result<()> {
        let commands = &self.inner.commands;
        let command = if on { commands.on() } else { commands.off() };
        self.send(command, self.default_rate()).await?;
        self.inner.state.lock().on = on;
        Ok(())
    }

    pub async fn set_brightness(&self, brightness: f64) -> Result<()> {
        self.brightness_at(brightness, self.default_rate()).await
    }

    pub async fn set_hue(&self, hue: f64) -> Result<()> {
        self.hue_at(hue, self.default_rate()).await
    }

    pub async fn set_saturation(&self, saturation: f64) -> Result<()> {
        self.saturation_at(saturation, self.default_rate()).await
    }

    pub async fn set_temperature(&self, temperature: f64) -> Result<()> {
        self.temperature_at(temperature, self.default_rate()).await
    }

    /// Set a color on a best-effort basis: each family gets as close as its
    /// channels allow.
    pub async fn set_color(&self, color: RGB) -> Result<()> {
        let rate = self.default_rate();
        match self.led_type() {
            LedType::Rgbw | LedType::Wrgb | LedType::BridgeLed => {
                if color == RGB::WHITE {
                    self.white().await?;
                } else {
                    self.hue_at(color.hue(), rate).await?;
                }
            }
            LedType::Rgbww => {
                let saturation = color.saturation();
                self.saturation_at(saturation, rate).await?;
                if saturation != 0.0 {
                    self.hue_at(color.hue(), rate).await?;
                }
            }
            LedType::Rgbcct => {
                self.hue_at(color.hue(), rate).await?;
                self.saturation_at(color.saturation(), rate).await?;
                self.brightness_at(color.value(), rate).await?;
            }
            LedType::White | LedType::Dimmer => {
                return Err(Error::Unsupported {
                    operation: "color",
                    led_type: self.led_type(),
                })
            }
        }
        self.inner.state.lock().color = color;
        Ok(())
    }

    /// Switch to white mode.
    pub async fn white(&self) -> Result<()> {
        let temperature = self.temperature();
        let command = self.inner.commands.white(temperature)?;
        self.send(command, self.default_rate()).await?;
        let mut state = self.inner.state.lock();
        state.color = RGB::WHITE;
        state.saturation = 0.0;
        Ok(())
    }

    pub async fn night_light(&self) -> Result<()> {
        let command = self.inner.commands.night_light()?;
        self.send(command, self.default_rate()).await
    }

    /// One step in the given direction.
    pub async fn nudge(&self, nudge: Nudge) -> Result<()> {
        let command = self.inner.commands.nudge(nudge)?;
        let rate = match nudge {
            Nudge::Brighter | Nudge::Dimmer | Nudge::Warmer | Nudge::Cooler => {
                self.default_rate()
            }
            _ => self.transition_rate(),
        };
        self.send(command, rate).await
    }

    /// Pair bulbs in pairing mode with this zone.
    pub async fn link(&self) -> Result<()> {
        let command = self.inner.commands.link()?;
        self.send(command, self.default_rate()).await
    }

    pub async fn unlink(&self) -> Result<()> {
        let command = self.inner.commands.unlink()?;
        self.send(command, self.default_rate()).await
    }

    /// Toggle the group twice, pausing `duration` after each toggle.
    pub async fn flash(&self, duration: Duration) -> Result<()> {
        let cancel = self.inner.link.shutdown().clone();
        self.flash_until(duration, &cancel).await
    }

    /// Move to `target` over `duration`.
    ///
    /// Crossing into or out of white happens at once, as does anything with
    /// a zero duration.
    pub async fn transition(&self, duration: Duration, target: TransitionTarget) -> Result<()> {
        let cancel = self.inner.link.shutdown().clone();
        self.transition_until(duration, target, &cancel).await
    }

    /// Queue a pipeline behind any that are already running.
    pub fn enqueue(&self, pipeline: Pipeline) -> Result<()> {
        pipeline.validate(&self.inner.commands)?;
        self.inner
            .jobs
            .send(Job::Run(pipeline))
            .map_err(|_| Error::Closed)
    }

    /// Stop the running pipeline at its next stage boundary. When nothing
    /// is running, the next pipeline to start is stopped instead.
    pub fn stop(&self) {
        self.inner.current.lock().cancel();
    }

    /// Resolves once every pipeline enqueued so far has finished.
    pub async fn wait_idle(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.inner.jobs.send(Job::Barrier(tx)).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    pub(crate) async fn brightness_at(&self, brightness: f64, rate: Rate) -> Result<()> {
        let brightness = check_unit("brightness", brightness)?;
        if self.inner.commands.supports(Operation::Brightness) {
            let command = self.inner.commands.brightness(brightness)?;
            self.send(command, rate).await?;
        } else {
            let current = self.brightness();
            let max = self.inner.commands.steps().brightness;
            let nudges = (Nudge::Dimmer, Nudge::Brighter);
            self.step_to("brightness", current, brightness, max, nudges, rate)
                .await?;
        }
        self.inner.state.lock().brightness = brightness;
        Ok(())
    }

    pub(crate) async fn hue_at(&self, hue: f64, rate: Rate) -> Result<()> {
        let command = self.inner.commands.hue(hue)?;
        self.send(command, rate).await?;
        let mut state = self.inner.state.lock();
        state.hue = hue;
        state.color = self.color_of(&state);
        Ok(())
    }

    pub(crate) async fn saturation_at(&self, saturation: f64, rate: Rate) -> Result<()> {
        let saturation = check_unit("saturation", saturation)?;
        let commands = &self.inner.commands;
        if saturation == 0.0 && commands.supports(Operation::White) {
            let command = commands.white(self.temperature())?;
            self.send(command, rate).await?;
        } else {
            let command = commands.saturation(saturation)?;
            self.send(command, rate).await?;
        }
        let mut state = self.inner.state.lock();
        state.saturation = saturation;
        state.color = self.color_of(&state);
        Ok(())
    }

    pub(crate) async fn temperature_at(&self, temperature: f64, rate: Rate) -> Result<()> {
        let temperature = check_unit("temperature", temperature)?;
        if self.inner.commands.supports(Operation::Temperature) {
            let command = self.inner.commands.temperature(temperature)?;
            self.send(command, rate).await?;
        } else {
            let current = self.temperature();
            let max = self.inner.commands.steps().temperature;
            let nudges = (Nudge::Warmer, Nudge::Cooler);
            self.step_to("temperature", current, temperature, max, nudges, rate)
                .await?;
        }
        self.inner.state.lock().temperature = temperature;
        Ok(())
    }

    fn color_of(&self, state: &GroupState) -> RGB {
        if self.inner.commands.supports(Operation::Saturation) {
            RGB::from_hue_saturation(state.hue, state.saturation)
        } else {
            RGB::from_hue_saturation(state.hue, 1.0)
        }
    }

    /// Reach `target` by single-step nudges. The extremes are sent twice as
    /// fast and twice over, since overshooting them is harmless.
    async fn step_to(
        &self,
        property: &'static str,
        current: f64,
        target: f64,
        max: u32,
        (down, up): (Nudge, Nudge),
        rate: Rate,
    ) -> Result<()> {
        let commands = &self.inner.commands;
        if !commands.supports(Operation::Nudge(down)) || !commands.supports(Operation::Nudge(up)) {
            return Err(Error::Unsupported {
                operation: property,
                led_type: self.led_type(),
            });
        }
        let rate = if target == 0.0 || target == 1.0 {
            Rate {
                wait: self.inner.link.config().transition_wait,
                reps: 2,
            }
        } else {
            Rate {
                wait: rate.wait,
                reps: 1,
            }
        };
        let nudge = if current > target { down } else { up };
        for _ in 0..util::steps(current, target, max)? {
            let command = commands.nudge(nudge)?;
            self.send(command, rate).await?;
        }
        Ok(())
    }

    pub(crate) async fn flash_until(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for _ in 0..2 {
            let on = self.is_on();
            self.set_on(!on).await?;
            if !pause(duration, cancel).await {
                break;
            }
        }
        Ok(())
    }

    pub(crate) async fn transition_until(
        &self,
        duration: Duration,
        target: TransitionTarget,
        cancel: &CancellationToken,
    ) -> Result<()> {
        target.validate()?;
        let mut color = target.color;
        let brightness = target.brightness;
        let temperature = target.temperature;
        let commands = &self.inner.commands;

        if let Some(rgb) = color {
            if rgb == RGB::WHITE && commands.supports(Operation::White) {
                self.white().await?;
                color = None;
            } else if self.color() == RGB::WHITE {
                self.set_color(rgb).await?;
                color = None;
            }
        }

        if duration.is_zero() {
            return self.apply(color, brightness, temperature).await;
        }

        let state = self.state();
        let steps = commands.steps();
        let mut tracks = Vec::new();
        if let Some(rgb) = color.filter(|rgb| *rgb != state.color) {
            if commands.supports(Operation::Hue) {
                tracks.push(Track {
                    property: Property::Hue,
                    start: state.hue,
                    end: rgb.hue(),
                    steps: util::steps(state.hue, rgb.hue(), steps.hue)?,
                });
            }
            if commands.supports(Operation::Saturation) {
                tracks.push(Track {
                    property: Property::Saturation,
                    start: state.saturation,
                    end: rgb.saturation(),
                    steps: util::steps(state.saturation, rgb.saturation(), steps.saturation)?,
                });
            }
        }
        if let Some(brightness) = brightness {
            tracks.push(Track {
                property: Property::Brightness,
                start: state.brightness,
                end: brightness,
                steps: util::steps(state.brightness, brightness, steps.brightness)?,
            });
        }
        if let Some(temperature) = temperature {
            tracks.push(Track {
                property: Property::Temperature,
                start: state.temperature,
                end: temperature,
                steps: util::steps(state.temperature, temperature, steps.temperature)?,
            });
        }

        let rate = self.transition_rate();
        let active = self.inner.link.active().max(1) as u32;
        let overhead = rate.wait * rate.reps * active;
        let plan = Plan::new(duration, tracks, overhead);
        if plan.is_empty() {
            return self.apply(color, brightness, temperature).await;
        }
        debug!(
            "Group {} transition: {} steps, {} commands, {:?} apart",
            self.name(),
            plan.total(),
            plan.commands(),
            plan.wait()
        );

        for i in 1..=plan.total() {
            if cancel.is_cancelled() {
                return Ok(());
            }
            for (property, value) in plan.firings(i).collect::<Vec<_>>() {
                match property {
                    Property::Brightness => self.brightness_at(value, rate).await?,
                    Property::Hue => self.hue_at(value, rate).await?,
                    Property::Saturation => self.saturation_at(value, rate).await?,
                    Property::Temperature => self.temperature_at(value, rate).await?,
                }
            }
            if !pause(plan.wait(), cancel).await {
                return Ok(());
            }
        }
        if let Some(rgb) = color {
            self.inner.state.lock().color = rgb;
        }
        Ok(())
    }

    /// Set whatever differs from the current state, without interpolating.
    async fn apply(
        &self,
        color: Option<RGB>,
        brightness: Option<f64>,
        temperature: Option<f64>,
    ) -> Result<()> {
        let state = self.state();
        if let Some(brightness) = brightness.filter(|b| *b != state.brightness) {
            self.set_brightness(brightness).await?;
        }
        if let Some(color) = color.filter(|c| *c != state.color) {
            self.set_color(color).await?;
        }
        if let Some(temperature) = temperature.filter(|t| *t != state.temperature) {
            self.set_temperature(temperature).await?;
        }
        Ok(())
    }
}

/// Sleep unless cancelled first. Returns false if cancelled.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

async fn work(group: Group, mut queue: mpsc::UnboundedReceiver<Job>) {
    let link = Arc::clone(&group.inner.link);
    let shutdown = link.shutdown().clone();
    // Installed before waiting for the next job, so a stop issued between
    // enqueue and pickup still reaches the pipeline.
    let mut cancel = group.inner.current.lock().clone();
    loop {
        let job = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        match job {
            Job::Barrier(reply) => {
                let _ = reply.send(());
            }
            Job::Run(pipeline) => {
                info!("Starting a pipeline on group {}", group.name());
                let result = {
                    let _active = link.activate();
                    pipeline.run(&group, &cancel).await
                };
                match result {
                    Ok(()) => {
                        link.observer()
                            .pipeline_finished(group.name(), cancel.is_cancelled(), None);
                    }
                    Err(err) => {
                        link.observer().pipeline_finished(
                            group.name(),
                            false,
                            Some(&err.to_string()),
                        );
                        break;
                    }
                }
                cancel = shutdown.child_token();
                *group.inner.current.lock() = cancel.clone();
            }
        }
    }
    debug!("Pipeline worker for group {} stopped", group.name());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = GroupState::default();
        assert!(!state.on);
        assert_eq!(state.brightness, 0.5);
        assert_eq!(state.temperature, 0.5);
        assert_eq!(state.color, RGB::WHITE);
    }

    #[test]
    fn test_transition_target_validation() {
        let both = TransitionTarget::default().color(RGB::RED).temperature(0.5);
        assert!(matches!(both.validate(), Err(Error::InvalidArgument(_))));
        let bad = TransitionTarget::default().brightness(1.2);
        assert!(matches!(
            bad.validate(),
            Err(Error::OutOfRange {
                name: "brightness",
                ..
            })
        ));
        let ok = TransitionTarget::default().color(RGB::BLUE).brightness(0.2);
        assert!(ok.validate().is_ok());
    }

    #[tokio::test]
    async fn test_pause_cancelled() {
        let cancel = CancellationToken::new();
        assert!(pause(Duration::from_millis(1), &cancel).await);
        cancel.cancel();
        assert!(!pause(Duration::from_secs(60), &cancel).await);
        assert!(!pause(Duration::ZERO, &cancel).await);
    }
}
