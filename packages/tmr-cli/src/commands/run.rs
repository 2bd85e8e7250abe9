use crate::cli::RunArgs;
use crate::display::{spawn_status_display, BellCueSink};
use crate::exit_codes;
use crate::output;
use crate::session_params;
use std::sync::Arc;
use tmr_rs::{telemetry_channel, OrchestrationLoop, SimulatedRealtimeSource};
use tokio_util::sync::CancellationToken;

pub async fn execute(args: RunArgs) -> i32 {
    let session = match session_params::load_session_config(&args.config) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let loop_config = match session_params::apply_loop_overrides(session.loop_config, &args) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::CONFIG_ERROR;
        }
    };
    let scorer_config = session_params::apply_scorer_overrides(session.scorer, &args.scorer);
    if let Some(warning) = session_params::replay_scorer_warning(&loop_config, &args.scorer) {
        log::warn!("{}", warning);
    }

    let scorer = match session_params::build_scorer(&args.scorer, &scorer_config) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let recording = match session_params::load_recording(&args.input) {
        Ok(r) => r,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let source = match SimulatedRealtimeSource::new(recording, loop_config.buffer_duration()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    };

    let (publisher, receiver) = telemetry_channel(loop_config.telemetry_capacity);
    let window_secs = loop_config.window_secs;

    let orchestrator = match OrchestrationLoop::new(
        loop_config,
        source,
        scorer,
        scorer_config.token.as_str(),
    ) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::CONFIG_ERROR;
        }
    }
    .with_cue_sink(Arc::new(BellCueSink::new(!args.no_bell)))
    .with_telemetry(Arc::new(publisher));

    let display = if args.quiet {
        None
    } else {
        Some(spawn_status_display(receiver, window_secs))
    };

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, stopping session");
            ctrl_c.cancel();
        }
    });

    let result = orchestrator.run(shutdown).await;

    if let Some(display) = display {
        if display.join().is_err() {
            log::error!("Status display thread panicked");
        }
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Session failed: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if !args.quiet {
        eprintln!(
            "Stream ended: {} results, {} cues, {} overflows ({} samples lost), {} timeouts",
            report.results.len(),
            report.cues_emitted,
            report.source.overflow_events,
            report.source.samples_lost,
            report.dispatch.timed_out
        );
        if let Some(ref path) = args.results {
            eprintln!("Sleep scores saved in {}", path);
        }
    }

    match output::emit(&report, args.compact, args.output.as_deref()) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
