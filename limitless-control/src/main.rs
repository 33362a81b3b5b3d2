use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};

use limitless_control_lib::bridge::{Bridge, BridgeConfig, BridgeStatus};
use limitless_control_lib::group::{Group, TransitionTarget};
use limitless_control_lib::led::color::{CliColors, RGB};
use limitless_control_lib::presets;
use limitless_control_lib::protocol::{LedType, Nudge};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    handle_cli(cli).await
}

/// This struct defines the command line interface of the application
#[derive(Parser)]
#[clap(
    name = "limitless_control",
    about = "Controls LimitlessLED / MiLight bulbs through their wifi bridge",
    version = "0.1.0"
)]
pub struct Cli {
    /// Host name or IP address of the bridge
    #[clap(long)]
    pub host: String,

    /// Bridge protocol version (1-6)
    #[clap(long = "bridge-version", default_value_t = 6)]
    pub bridge_version: u8,

    /// UDP port, defaults to the port of the bridge version
    #[clap(long)]
    pub port: Option<u16>,

    /// How many times each command is sent
    #[clap(long)]
    pub reps: Option<u32>,

    /// Pause after each command in milliseconds
    #[clap(long, value_parser = parse_duration)]
    pub min_wait: Option<Duration>,

    /// Keep-alive interval in milliseconds (v6 only)
    #[clap(long, value_parser = parse_duration)]
    pub keep_alive_interval: Option<Duration>,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Supported output formats for the `status` command.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum OutputFormat {
    /// Plain text format.
    Plaintext,
    /// JSON format.
    Json,
    /// YAML format.
    Yaml,
}

/// Subcommands available for the CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Connect and print the bridge session status
    #[clap(name = "status")]
    Status {
        /// Output format (plaintext, json, yaml)
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Plaintext)]
        output: OutputFormat,
    },
    /// Control one group of the bridge
    #[clap(name = "group")]
    Group {
        /// Zone number of the group
        #[clap(long, default_value_t = 1)]
        zone: u8,

        /// Kind of bulbs in the group
        #[clap(long, value_enum)]
        led_type: LedType,

        #[clap(subcommand)]
        action: GroupAction,
    },
}

/// Actions available under the `group` subcommand
#[derive(Subcommand)]
pub enum GroupAction {
    On,
    Off,
    /// Sets the brightness (0.0-1.0)
    Brightness { value: f64 },
    /// Sets the hue (0.0-1.0)
    Hue { value: f64 },
    /// Sets the saturation (0.0-1.0)
    Saturation { value: f64 },
    /// Sets the white temperature (0.0-1.0)
    Temperature { value: f64 },
    /// Sets a color, by name or by components
    Color {
        /// The color by name
        #[clap(value_enum)]
        color: Option<CliColors>,

        /// Red component of the color (0-255)
        #[clap(short = 'r', long = "red", value_parser = clap::value_parser!(u8))]
        red: Option<u8>,

        /// Green component of the color (0-255)
        #[clap(short = 'g', long = "green", value_parser = clap::value_parser!(u8))]
        green: Option<u8>,

        /// Blue component of the color (0-255)
        #[clap(short = 'b', long = "blue", value_parser = clap::value_parser!(u8))]
        blue: Option<u8>,
    },
    /// Switches to white mode
    White,
    #[clap(name = "night-light")]
    NightLight,
    /// Steps once in one direction
    Nudge {
        #[clap(value_enum)]
        direction: Nudge,
    },
    /// Pairs bulbs in pairing mode with the zone (v6 only)
    Link,
    /// Unpairs bulbs from the zone (v6 only)
    Unlink,
    /// Fades to a color and/or brightness
    Transition {
        /// Duration in milliseconds
        #[clap(long, value_parser = parse_duration)]
        duration: Duration,

        #[clap(long, value_enum)]
        color: Option<CliColors>,

        #[clap(long)]
        brightness: Option<f64>,

        #[clap(long)]
        temperature: Option<f64>,
    },
    /// Runs a preset pipeline for a while, then stops it
    Preset {
        #[clap(value_enum)]
        preset: Preset,

        /// How long to let it run, in milliseconds
        #[clap(long = "run-for", value_parser = parse_duration, default_value = "10000")]
        run_for: Duration,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Alarm,
    Colorloop,
}

fn parse_duration(s: &str) -> Result<Duration, &'static str> {
    let millis = s
        .parse::<u64>()
        .map_err(|_| "could not parse duration in milliseconds")?;
    Ok(Duration::from_millis(millis))
}

fn bridge_config(cli: &Cli) -> BridgeConfig {
    let mut config = BridgeConfig::for_version(cli.bridge_version);
    config.port = cli.port;
    if let Some(reps) = cli.reps {
        config = config.with_reps(reps);
    }
    if let Some(wait) = cli.min_wait {
        config = config.with_min_wait(wait);
    }
    if let Some(interval) = cli.keep_alive_interval {
        config = config.with_keep_alive_interval(interval);
    }
    config
}

fn print_status(status: &BridgeStatus, output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Plaintext => {
            println!("State: {}", status.state);
            match status.selected {
                Some(selected) => {
                    println!("Selected: {} zone {}", selected.led_type, selected.zone)
                }
                None => println!("Selected: none"),
            }
            println!("Sequence: {}", status.sequence);
        }
        OutputFormat::Json => {
            let json = serde_json::to_string(status)?;
            println!("{}", json);
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(status)?;
            println!("{}", yaml);
        }
    }
    Ok(())
}

async fn handle_cli(cli: Cli) -> Result<()> {
    let config = bridge_config(&cli);
    let bridge = Bridge::connect(&cli.host, config).await?;

    match cli.command {
        Commands::Status { output } => {
            print_status(&bridge.status(), output)?;
        }
        Commands::Group {
            zone,
            led_type,
            action,
        } => {
            let group = bridge.add_group(zone, &format!("zone-{}", zone), led_type)?;
            handle_group_action(&group, action).await?;
        }
    }

    bridge.finish().await?;
    Ok(())
}

async fn handle_group_action(group: &Group, action: GroupAction) -> Result<()> {
    match action {
        GroupAction::On => group.turn_on().await?,
        GroupAction::Off => group.turn_off().await?,
        GroupAction::Brightness { value } => group.set_brightness(value).await?,
        GroupAction::Hue { value } => group.set_hue(value).await?,
        GroupAction::Saturation { value } => group.set_saturation(value).await?,
        GroupAction::Temperature { value } => group.set_temperature(value).await?,
        GroupAction::Color {
            color,
            red,
            green,
            blue,
        } => {
            let color_to_show = match (color, red, green, blue) {
                (Some(color_name), None, None, None) => color_name.into(),
                (None, Some(r), Some(g), Some(b)) => RGB::new(r, g, b),
                _ => return Err(anyhow!("Invalid color specification")),
            };
            group.set_color(color_to_show).await?;
            println!("Set color: {:?}", color_to_show);
        }
        GroupAction::White => group.white().await?,
        GroupAction::NightLight => group.night_light().await?,
        GroupAction::Nudge { direction } => group.nudge(direction).await?,
        GroupAction::Link => group.link().await?,
        GroupAction::Unlink => group.unlink().await?,
        GroupAction::Transition {
            duration,
            color,
            brightness,
            temperature,
        } => {
            let target = TransitionTarget {
                color: color.map(RGB::from),
                brightness,
                temperature,
            };
            group.transition(duration, target).await?;
        }
        GroupAction::Preset { preset, run_for } => {
            let pipeline = match preset {
                Preset::Alarm => presets::alarm(),
                Preset::Colorloop => presets::colorloop(),
            };
            group.enqueue(pipeline)?;
            tokio::time::sleep(run_for).await;
            group.stop();
        }
    }
    Ok(())
}
