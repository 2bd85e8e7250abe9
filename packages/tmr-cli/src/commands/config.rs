use crate::cli::ConfigArgs;
use crate::exit_codes;
use crate::output;
use tmr_rs::SessionConfig;

pub fn execute(args: ConfigArgs) -> i32 {
    match output::emit(&SessionConfig::default(), args.compact, args.output.as_deref()) {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit_codes::EXECUTION_ERROR
        }
    }
}
