use clap::{Arg, ArgMatches, Command};
use graphping::config::{DEFAULT_CHART_COLOR, DEFAULT_COUNT, DEFAULT_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use graphping::{BatchConfig, SessionConfig};
use std::ffi::OsString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Watch(SessionConfig),
    Batch(BatchConfig),
}

fn target_arg() -> Arg {
    Arg::new("target")
        .help("Target hostname or IP address")
        .required(true)
        .index(1)
}

fn timeout_arg() -> Arg {
    Arg::new("timeout")
        .short('w')
        .long("timeout")
        .help("Timeout in milliseconds to wait for each reply")
        .value_name("ms")
        .value_parser(clap::value_parser!(u64))
}

fn interval_arg() -> Arg {
    Arg::new("interval")
        .short('i')
        .long("interval")
        .help("Milliseconds between probes")
        .value_name("ms")
        .value_parser(clap::value_parser!(u64))
}

pub fn build_cli() -> Command {
    Command::new("graphping")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Chart ICMP round-trip latency to a host")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("watch")
                .about("Probe continuously and draw a live latency chart until stopped")
                .arg(target_arg())
                .arg(timeout_arg())
                .arg(interval_arg())
                .arg(
                    Arg::new("color")
                        .long("color")
                        .help("Chart color as #rrggbb")
                        .value_name("hex")
                        .default_value(DEFAULT_CHART_COLOR),
                ),
        )
        .subcommand(
            Command::new("batch")
                .about("Send a fixed number of probes and report average latency and loss")
                .arg(target_arg())
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .help("Number of echo requests to send")
                        .value_name("count")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(timeout_arg())
                .arg(interval_arg()),
        )
}

pub fn parse_args() -> anyhow::Result<Mode> {
    parse_from(std::env::args_os())
}

pub fn parse_from<I, T>(args: I) -> anyhow::Result<Mode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_cli().try_get_matches_from(args)?;

    match matches.subcommand() {
        Some(("watch", sub)) => {
            let config = SessionConfig::new(required_string(sub, "target")?)
                .with_timeout_ms(number(sub, "timeout", DEFAULT_TIMEOUT_MS))
                .with_interval_ms(number(sub, "interval", DEFAULT_INTERVAL_MS))
                .with_chart_color(
                    sub.get_one::<String>("color")
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_CHART_COLOR.to_string()),
                );
            Ok(Mode::Watch(config))
        }
        Some(("batch", sub)) => {
            let config = BatchConfig::new(required_string(sub, "target")?)
                .with_count(sub.get_one::<u32>("count").copied().unwrap_or(DEFAULT_COUNT))
                .with_timeout_ms(number(sub, "timeout", DEFAULT_TIMEOUT_MS))
                .with_interval_ms(number(sub, "interval", DEFAULT_INTERVAL_MS));
            Ok(Mode::Batch(config))
        }
        _ => Err(anyhow::anyhow!("A subcommand is required: watch or batch")),
    }
}

fn required_string(matches: &ArgMatches, name: &str) -> anyhow::Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Missing argument: {}", name))
}

fn number(matches: &ArgMatches, name: &str, default: u64) -> u64 {
    matches.get_one::<u64>(name).copied().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_defaults() {
        let mode = parse_from(["graphping", "watch", "10.0.0.1"]).unwrap();
        assert_eq!(mode, Mode::Watch(SessionConfig::new("10.0.0.1")));
    }

    #[test]
    fn test_watch_options() {
        let mode = parse_from([
            "graphping", "watch", "example.com", "-w", "800", "--interval", "100", "--color", "#00ff00",
        ])
        .unwrap();
        let Mode::Watch(config) = mode else {
            panic!("expected watch mode");
        };
        assert_eq!(config.target, "example.com");
        assert_eq!(config.timeout_ms, 800);
        assert_eq!(config.interval_ms, 100);
        assert_eq!(config.chart_color, "#00ff00");
    }

    #[test]
    fn test_batch_options() {
        let mode = parse_from(["graphping", "batch", "10.0.0.1", "-n", "10", "-i", "50"]).unwrap();
        assert_eq!(
            mode,
            Mode::Batch(BatchConfig::new("10.0.0.1").with_count(10).with_interval_ms(50))
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_from(["graphping"]).is_err());
        assert!(parse_from(["graphping", "watch"]).is_err());
        assert!(parse_from(["graphping", "batch", "10.0.0.1", "-n", "-3"]).is_err());
        assert!(parse_from(["graphping", "watch", "10.0.0.1", "-w", "soon"]).is_err());
    }

    #[test]
    fn test_zero_values_reach_validation() {
        // clap accepts 0; the session layer rejects it
        let Mode::Batch(config) = parse_from(["graphping", "batch", "10.0.0.1", "-n", "0"]).unwrap() else {
            panic!("expected batch mode");
        };
        assert!(config.validate().is_err());
    }
}
