use clap::Parser;
use clap::error::ErrorKind;
use dbsadmin::cli;
use dbsadmin::envelope::{
    EXIT_INVALID_COMMAND, EXIT_INVALID_COMMAND_PARAMETER, EXIT_INVALID_OPTION,
};

fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Bare invocations show the help text and succeed.
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::MissingSubcommand
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) {
                let _ = err.print();
                std::process::exit(0);
            }
            let code = match err.kind() {
                ErrorKind::InvalidSubcommand => {
                    println!("Error: 11000 (Invalid command)");
                    EXIT_INVALID_COMMAND
                }
                ErrorKind::UnknownArgument => {
                    println!("Error: 11001 (Invalid option)");
                    EXIT_INVALID_OPTION
                }
                _ => {
                    println!("Error: 10007 (Requested object does not exist)");
                    EXIT_INVALID_COMMAND_PARAMETER
                }
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };
    std::process::exit(cli.run());
}
