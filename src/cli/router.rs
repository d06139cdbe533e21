//! Command routing and execution
//!
//! This module handles routing CLI commands to their respective implementations.

use crate::app::AppConfig;
use crate::cli::args::Commands;
use crate::cli::commands::*;
use anyhow::Result;

/// Execute a CLI command based on the parsed arguments
pub async fn execute_command(command: Commands, app: &AppConfig) -> Result<()> {
    match command {
        Commands::Extract {
            input,
            func_name,
            output,
            mode,
        } => run_extract_command(&input, &func_name, &output, mode),
        Commands::Invoke {
            func_script,
            element,
            return_output,
            interpreter,
        } => {
            run_invoke_command(
                app,
                InvokeParams {
                    func_script,
                    element,
                    return_output,
                    interpreter,
                },
            )
            .await
        }
        Commands::Run {
            source,
            function,
            input,
            log,
            pools,
            no_clear,
            no_results,
            mode,
        } => {
            run_dispatch_command(
                app,
                RunParams {
                    source,
                    function,
                    input,
                    log,
                    pools,
                    clear_workspace: !no_clear,
                    want_results: !no_results,
                    mode,
                },
            )
            .await
        }
        Commands::Tune {
            min,
            max,
            tolerance,
            max_iterations,
            command,
        } => {
            run_tune_command(TuneParams {
                min,
                max,
                tolerance,
                max_iterations,
                command,
            })
            .await
        }
        Commands::Clear => run_clear_command(app).await,
    }
}
