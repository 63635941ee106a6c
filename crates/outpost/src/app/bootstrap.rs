use std::path::{Path, PathBuf};

use engine::{resolve_app_paths, StartupError};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::gameplay::{CommandError, RunLength, Scenario, SessionConfig, SessionError};

pub(crate) const USAGE: &str = "\
usage: outpost [options]

  --load <path>        start from a save file instead of a fresh island
  --scenario <name>    lumberjack | hunter | settler (fresh sessions only)
  --ticks <n>          run the simulation for n ticks
  --seconds <n>        run the simulation for n seconds of game time
  --save <path>        write the session when the run finishes
  --help               print this message

Bare file names for --load and --save resolve inside the saves directory.";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error("{0}\n\n{usage}", usage = USAGE)]
    Args(String),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("scenario setup failed: {0}")]
    Scenario(#[from] CommandError),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionSource {
    New(Option<Scenario>),
    Load(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunPlan {
    pub(crate) source: SessionSource,
    pub(crate) length: Option<RunLength>,
    pub(crate) save_to: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Launch {
    Help,
    Run(RunPlan),
}

pub(crate) struct AppWiring {
    pub(crate) config: SessionConfig,
    pub(crate) launch: Launch,
}

pub(crate) fn build_app(
    args: impl IntoIterator<Item = String>,
) -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Outpost Startup ===");

    let launch = match parse_args(args)? {
        Launch::Run(RunPlan {
            source,
            length,
            save_to,
        }) => Launch::Run(RunPlan {
            source: match source {
                SessionSource::Load(path) => SessionSource::Load(resolve_save_path(path)?),
                source => source,
            },
            length,
            save_to: save_to.map(resolve_save_path).transpose()?,
        }),
        Launch::Help => Launch::Help,
    };
    let config = SessionConfig::from_env();
    info!(
        ticks_per_second = config.ticks_per_second,
        content_dir = ?config.content_dir,
        "config_loaded"
    );

    Ok(AppWiring { config, launch })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

pub(crate) fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Launch, BootstrapError> {
    let mut load = None;
    let mut scenario = None;
    let mut length = None;
    let mut save_to = None;

    let mut args = args.into_iter();
    while let Some(flag) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| BootstrapError::Args(format!("{name} needs a value")))
        };
        match flag.as_str() {
            "--help" | "-h" => return Ok(Launch::Help),
            "--load" => load = Some(PathBuf::from(value("--load")?)),
            "--save" => save_to = Some(PathBuf::from(value("--save")?)),
            "--scenario" => {
                scenario = Some(
                    value("--scenario")?
                        .parse::<Scenario>()
                        .map_err(BootstrapError::Args)?,
                )
            }
            "--ticks" => {
                let raw = value("--ticks")?;
                let ticks = raw.parse::<u64>().map_err(|error| {
                    BootstrapError::Args(format!("--ticks '{raw}': {error}"))
                })?;
                length = Some(RunLength::Ticks(ticks));
            }
            "--seconds" => {
                let raw = value("--seconds")?;
                let seconds = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
                    .ok_or_else(|| {
                        BootstrapError::Args(format!(
                            "--seconds '{raw}' is not a non-negative number"
                        ))
                    })?;
                length = Some(RunLength::Seconds(seconds));
            }
            other => return Err(BootstrapError::Args(format!("unknown argument '{other}'"))),
        }
    }

    let source = match (load, scenario) {
        (Some(_), Some(_)) => {
            return Err(BootstrapError::Args(
                "--scenario cannot be combined with --load".to_string(),
            ))
        }
        (Some(path), None) => SessionSource::Load(path),
        (None, scenario) => SessionSource::New(scenario),
    };
    Ok(Launch::Run(RunPlan {
        source,
        length,
        save_to,
    }))
}

fn is_bare_file_name(path: &Path) -> bool {
    !path.is_absolute() && path.components().count() == 1
}

fn resolve_save_path(path: PathBuf) -> Result<PathBuf, BootstrapError> {
    if !is_bare_file_name(&path) {
        return Ok(path);
    }
    let paths = resolve_app_paths()?;
    Ok(paths.saves_dir.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_scenario_run_and_save() {
        let launch = parse_args(args(&[
            "--scenario",
            "hunter",
            "--seconds",
            "30",
            "--save",
            "out/hunter.json",
        ]))
        .expect("parse");
        assert_eq!(
            launch,
            Launch::Run(RunPlan {
                source: SessionSource::New(Some(Scenario::Hunter)),
                length: Some(RunLength::Seconds(30.0)),
                save_to: Some(PathBuf::from("out/hunter.json")),
            })
        );
    }

    #[test]
    fn empty_args_start_a_fresh_session_without_running() {
        assert_eq!(
            parse_args(Vec::new()).expect("parse"),
            Launch::Run(RunPlan {
                source: SessionSource::New(None),
                length: None,
                save_to: None,
            })
        );
    }

    #[test]
    fn help_wins_over_everything_else() {
        assert_eq!(
            parse_args(args(&["--ticks", "3", "--help", "--bogus"])).expect("parse"),
            Launch::Help
        );
    }

    #[test]
    fn rejects_bad_values_and_conflicts() {
        for bad in [
            args(&["--ticks"]),
            args(&["--ticks", "-4"]),
            args(&["--seconds", "NaN"]),
            args(&["--scenario", "farm"]),
            args(&["--load", "a.json", "--scenario", "settler"]),
            args(&["--frobnicate"]),
        ] {
            let error = parse_args(bad.clone()).expect_err("should fail");
            assert!(
                matches!(error, BootstrapError::Args(_)),
                "{bad:?} gave {error}"
            );
        }
    }

    #[test]
    fn only_bare_names_go_to_the_saves_dir() {
        assert!(is_bare_file_name(Path::new("slot.json")));
        assert!(!is_bare_file_name(Path::new("saves/slot.json")));
        assert!(!is_bare_file_name(Path::new("./slot.json")));
    }
}
