use std::process::ExitCode;

use tracing::{error, info};

use super::bootstrap::{AppWiring, BootstrapError, Launch, RunPlan, SessionSource, USAGE};
use super::gameplay::{load_session_with, new_session_with, scenarios, Session, SessionConfig};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let plan = match app.launch {
        Launch::Help => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Launch::Run(plan) => plan,
    };

    match run_headless(app.config, plan) {
        Ok(mut session) => {
            let buildings = session
                .world()
                .objects()
                .filter(|object| object.is_building())
                .count();
            let units = session
                .world()
                .objects()
                .filter(|object| object.is_unit())
                .count();
            info!(
                tick = session.cur_tick(),
                objects = session.world().len(),
                buildings,
                units,
                "run_summary"
            );
            session.end(true);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_headless(config: SessionConfig, plan: RunPlan) -> Result<Session, BootstrapError> {
    let mut session = match plan.source {
        SessionSource::New(scenario) => {
            let mut session = new_session_with(config)?;
            if let Some(scenario) = scenario {
                scenarios::setup(&mut session, scenario)?;
            }
            session
        }
        SessionSource::Load(path) => load_session_with(&path, config)?,
    };

    if let Some(length) = plan.length {
        let ticks = session.run(length)?;
        info!(ticks, tick = session.cur_tick(), "headless_run_finished");
    }
    if let Some(path) = plan.save_to {
        session.save(&path)?;
    }
    Ok(session)
}
