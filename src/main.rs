use std::process;
use log::error;

use planeio::commands::{cli, CommandFactory, PlaneioCommandFactory};
use planeio::utils::logger::Logger;

fn main() {
    let matches = cli().get_matches();

    let verbosity = matches.get_count("verbose");
    let log_file = matches.get_one::<String>("log-file").map(String::as_str);
    if let Err(e) = Logger::init_global_logger(verbosity, log_file) {
        eprintln!("Error setting up global logger: {}", e);
        process::exit(1);
    }

    let logger = match matches.get_one::<String>("report") {
        Some(path) => match Logger::new(path) {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error opening report file: {}", e);
                process::exit(1);
            }
        },
        None => Logger::disabled(),
    };

    let factory = PlaneioCommandFactory::new();

    let command_result = factory.create_command(&matches, &logger);
    match command_result {
        Ok(command) => {
            if let Err(e) = command.execute() {
                error!("Command execution error: {}", e);
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
        Err(e) => {
            error!("Failed to create command: {}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
}
