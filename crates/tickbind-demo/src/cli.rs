#![forbid(unsafe_code)]

//! Command-line argument parsing for the tick/tock demo.
//!
//! Parses args manually to keep the binary lean. Supports environment
//! variable overrides via the `TICKBIND_*` prefix.

use std::env;
use std::process;

use tickbind_runtime::presenter::ScreenMode;

use crate::app::KeyMode;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
tickbind demo: three children, two sources, one timer

USAGE:
    tickbind-demo [OPTIONS]

OPTIONS:
    --tick-ms=N          Delay between firings in ms (default: 2000)
    --ticks=N            Quit after N firings, 0 = run forever (default: 0)
    --exit-after-ms=N    Quit after N ms of program time, 0 = off (default: 0)
    --keys=MODE          Subscriber keys: 'explicit' (1, 2, 3) or 'allocated' (default: explicit)
    --screen-mode=MODE   Output: 'redraw' or 'append' (default: redraw)
    --jsonl=PATH         Append one JSON record per firing ('-' for stderr)
    --help, -h           Show this help message
    --version, -V        Show version

ENVIRONMENT VARIABLES:
    TICKBIND_TICK_MS        Override --tick-ms
    TICKBIND_TICKS          Override --ticks
    TICKBIND_EXIT_AFTER_MS  Override --exit-after-ms
    TICKBIND_KEYS           Override --keys
    TICKBIND_SCREEN_MODE    Override --screen-mode
    TICKBIND_JSONL          Override --jsonl
    TICKBIND_LOG            Log filter directives (default: warn)";

fn screen_mode_from_name(name: &str) -> Option<ScreenMode> {
    match name.trim().to_ascii_lowercase().as_str() {
        "redraw" => Some(ScreenMode::Redraw),
        "append" => Some(ScreenMode::Append),
        _ => None,
    }
}

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opts {
    /// Delay between timer firings.
    pub tick_ms: u64,
    /// Quit after this many firings (0 = never).
    pub ticks: u64,
    /// Auto-exit after this many milliseconds (0 = disabled).
    pub exit_after_ms: u64,
    pub keys: KeyMode,
    pub screen_mode: ScreenMode,
    /// JSONL output path, `-` meaning stderr.
    pub jsonl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParseError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            tick_ms: 2000,
            ticks: 0,
            exit_after_ms: 0,
            keys: KeyMode::Explicit,
            screen_mode: ScreenMode::Redraw,
            jsonl: None,
        }
    }
}

fn parse_number(flag: &'static str, val: &str) -> Result<u64, ParseError> {
    val.parse().map_err(|_| ParseError::InvalidValue {
        flag,
        value: val.to_string(),
    })
}

impl Opts {
    /// Parse command-line arguments and environment variables.
    ///
    /// Environment variables take precedence over defaults but are overridden
    /// by explicit command-line flags.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(ParseError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(ParseError::Version) => {
                println!("tickbind-demo {VERSION}");
                process::exit(0);
            }
            Err(ParseError::InvalidValue { flag, value }) => {
                eprintln!("Invalid {flag} value: {value}");
                process::exit(1);
            }
            Err(ParseError::UnknownArg(arg)) => {
                eprintln!("Unknown argument: {arg}");
                eprintln!("Run with --help for usage information.");
                process::exit(1);
            }
        }
    }

    fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        // Environment first; unparseable values are ignored.
        if let Some(val) = get_env("TICKBIND_TICK_MS")
            && let Ok(n) = val.trim().parse()
        {
            opts.tick_ms = n;
        }
        if let Some(val) = get_env("TICKBIND_TICKS")
            && let Ok(n) = val.trim().parse()
        {
            opts.ticks = n;
        }
        if let Some(val) = get_env("TICKBIND_EXIT_AFTER_MS")
            && let Ok(n) = val.trim().parse()
        {
            opts.exit_after_ms = n;
        }
        if let Some(val) = get_env("TICKBIND_KEYS")
            && let Some(mode) = KeyMode::from_name(&val)
        {
            opts.keys = mode;
        }
        if let Some(val) = get_env("TICKBIND_SCREEN_MODE")
            && let Some(mode) = screen_mode_from_name(&val)
        {
            opts.screen_mode = mode;
        }
        if let Some(val) = get_env("TICKBIND_JSONL")
            && !val.trim().is_empty()
        {
            opts.jsonl = Some(val);
        }

        // Command-line args override env vars
        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => return Err(ParseError::Help),
                "--version" | "-V" => return Err(ParseError::Version),
                other => {
                    if let Some(val) = other.strip_prefix("--tick-ms=") {
                        opts.tick_ms = parse_number("--tick-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--ticks=") {
                        opts.ticks = parse_number("--ticks", val)?;
                    } else if let Some(val) = other.strip_prefix("--exit-after-ms=") {
                        opts.exit_after_ms = parse_number("--exit-after-ms", val)?;
                    } else if let Some(val) = other.strip_prefix("--keys=") {
                        opts.keys =
                            KeyMode::from_name(val).ok_or_else(|| ParseError::InvalidValue {
                                flag: "--keys",
                                value: val.to_string(),
                            })?;
                    } else if let Some(val) = other.strip_prefix("--screen-mode=") {
                        opts.screen_mode =
                            screen_mode_from_name(val).ok_or_else(|| ParseError::InvalidValue {
                                flag: "--screen-mode",
                                value: val.to_string(),
                            })?;
                    } else if let Some(val) = other.strip_prefix("--jsonl=") {
                        if val.trim().is_empty() {
                            return Err(ParseError::InvalidValue {
                                flag: "--jsonl",
                                value: val.to_string(),
                            });
                        }
                        opts.jsonl = Some(val.to_string());
                    } else {
                        return Err(ParseError::UnknownArg(other.to_string()));
                    }
                }
            }
        }

        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_with_env<I, S>(
        args: I,
        env_pairs: &[(&'static str, &'static str)],
    ) -> Result<Opts, ParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = std::collections::HashMap::new();
        for (key, value) in env_pairs {
            map.insert(*key, *value);
        }
        Opts::parse_from_env_and_args(args, |key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn default_opts() {
        let opts = Opts::default();
        assert_eq!(opts.tick_ms, 2000);
        assert_eq!(opts.ticks, 0);
        assert_eq!(opts.exit_after_ms, 0);
        assert_eq!(opts.keys, KeyMode::Explicit);
        assert_eq!(opts.screen_mode, ScreenMode::Redraw);
        assert!(opts.jsonl.is_none());
    }

    #[test]
    fn no_args_gives_defaults() {
        let opts = parse_with_env(Vec::<&str>::new(), &[]).unwrap();
        assert_eq!(opts, Opts::default());
    }

    #[test]
    fn version_string_nonempty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn help_text_lists_every_env_override() {
        for var in [
            "TICKBIND_TICK_MS",
            "TICKBIND_TICKS",
            "TICKBIND_EXIT_AFTER_MS",
            "TICKBIND_KEYS",
            "TICKBIND_SCREEN_MODE",
            "TICKBIND_JSONL",
            "TICKBIND_LOG",
        ] {
            assert!(HELP_TEXT.contains(var), "missing {var}");
        }
    }

    #[test]
    fn help_and_version_flags() {
        assert_eq!(parse_with_env(["--help"], &[]), Err(ParseError::Help));
        assert_eq!(parse_with_env(["-h"], &[]), Err(ParseError::Help));
        assert_eq!(parse_with_env(["--version"], &[]), Err(ParseError::Version));
        assert_eq!(parse_with_env(["-V"], &[]), Err(ParseError::Version));
    }

    #[test]
    fn parses_all_flags() {
        let opts = parse_with_env(
            [
                "--tick-ms=50",
                "--ticks=3",
                "--exit-after-ms=1000",
                "--keys=allocated",
                "--screen-mode=append",
                "--jsonl=fires.jsonl",
            ],
            &[],
        )
        .unwrap();
        assert_eq!(opts.tick_ms, 50);
        assert_eq!(opts.ticks, 3);
        assert_eq!(opts.exit_after_ms, 1000);
        assert_eq!(opts.keys, KeyMode::Allocated);
        assert_eq!(opts.screen_mode, ScreenMode::Append);
        assert_eq!(opts.jsonl.as_deref(), Some("fires.jsonl"));
    }

    #[test]
    fn env_applies_when_no_flag() {
        let opts = parse_with_env(
            Vec::<&str>::new(),
            &[
                ("TICKBIND_TICK_MS", "250"),
                ("TICKBIND_TICKS", "4"),
                ("TICKBIND_KEYS", "Allocated"),
                ("TICKBIND_SCREEN_MODE", "append"),
                ("TICKBIND_JSONL", "-"),
            ],
        )
        .unwrap();
        assert_eq!(opts.tick_ms, 250);
        assert_eq!(opts.ticks, 4);
        assert_eq!(opts.keys, KeyMode::Allocated);
        assert_eq!(opts.screen_mode, ScreenMode::Append);
        assert_eq!(opts.jsonl.as_deref(), Some("-"));
    }

    #[test]
    fn args_override_env() {
        let opts = parse_with_env(
            ["--tick-ms=10", "--keys=explicit"],
            &[("TICKBIND_TICK_MS", "250"), ("TICKBIND_KEYS", "allocated")],
        )
        .unwrap();
        assert_eq!(opts.tick_ms, 10);
        assert_eq!(opts.keys, KeyMode::Explicit);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let opts = parse_with_env(
            Vec::<&str>::new(),
            &[
                ("TICKBIND_TICK_MS", "soon"),
                ("TICKBIND_SCREEN_MODE", "fullscreen"),
                ("TICKBIND_JSONL", "  "),
            ],
        )
        .unwrap();
        assert_eq!(opts, Opts::default());
    }

    #[test]
    fn invalid_flag_values_are_errors() {
        assert_eq!(
            parse_with_env(["--tick-ms=fast"], &[]),
            Err(ParseError::InvalidValue {
                flag: "--tick-ms",
                value: "fast".into()
            })
        );
        assert_eq!(
            parse_with_env(["--keys=random"], &[]),
            Err(ParseError::InvalidValue {
                flag: "--keys",
                value: "random".into()
            })
        );
        assert_eq!(
            parse_with_env(["--screen-mode=alt"], &[]),
            Err(ParseError::InvalidValue {
                flag: "--screen-mode",
                value: "alt".into()
            })
        );
        assert!(matches!(
            parse_with_env(["--jsonl="], &[]),
            Err(ParseError::InvalidValue { flag: "--jsonl", .. })
        ));
    }

    #[test]
    fn unknown_argument() {
        assert_eq!(
            parse_with_env(["--bogus"], &[]),
            Err(ParseError::UnknownArg("--bogus".into()))
        );
    }

    #[test]
    fn later_flag_wins() {
        let opts = parse_with_env(["--ticks=1", "--ticks=9"], &[]).unwrap();
        assert_eq!(opts.ticks, 9);
    }
}
