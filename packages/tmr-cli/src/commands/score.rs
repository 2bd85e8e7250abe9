use crate::cli::ScoreArgs;
use crate::exit_codes;
use crate::output;
use crate::session_params;
use serde::Serialize;
use tmr_rs::offline::{self, AgreementReport};
use tmr_rs::Stage;

#[derive(Serialize)]
struct ScoreOutput {
    epochs: usize,
    unknown_epochs: usize,
    auto_scores: String,
    agreement: Option<AgreementReport>,
}

pub async fn execute(args: ScoreArgs) -> i32 {
    let session = match session_params::load_session_config(&args.config) {
        Ok(s) => s,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::CONFIG_ERROR;
        }
    };
    let scorer_config = session_params::apply_scorer_overrides(session.scorer, &args.scorer);

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

    let expert = match args.expert {
        Some(ref path) => match offline::load_expert_scores(path) {
            Ok(stages) => Some(stages),
            Err(e) => {
                eprintln!("Error: Failed to read expert scores '{}': {}", path, e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => None,
    };

    let epochs = offline::epoch_count(&recording);
    if epochs < 2 {
        eprintln!(
            "Error: Recording is {:.1} s long; at least two 30 s epochs are needed",
            recording.duration_secs()
        );
        return exit_codes::INPUT_ERROR;
    }

    if !args.quiet {
        eprintln!("Scoring {} epochs with the {} scorer...", epochs, scorer.name());
    }

    let results = offline::score_epochs(&recording, scorer.as_ref(), &scorer_config.token).await;

    if let Err(e) = offline::save_auto_scores(&results, &args.auto_scores) {
        eprintln!("Error: Failed to save auto scores: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if !args.quiet {
        eprintln!("Saving auto scores in {}", args.auto_scores);
    }

    let auto: Vec<Stage> = results.iter().map(|r| r.stage).collect();
    let agreement = match expert {
        Some(ref expert) => match offline::agreement(&auto, expert) {
            Ok(report) => {
                if !args.quiet {
                    eprintln!(
                        "Auto scoring agreement with expert scorer: {:.2}%, Kappa: {:.3}",
                        report.accuracy_pct, report.kappa
                    );
                }
                Some(report)
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::INPUT_ERROR;
            }
        },
        None => None,
    };

    let summary = ScoreOutput {
        epochs: results.len(),
        unknown_epochs: auto.iter().filter(|s| **s == Stage::Unknown).count(),
        auto_scores: args.auto_scores.clone(),
        agreement,
    };

    match output::emit(&summary, args.compact, args.output.as_deref()) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
