// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The petrel binary: parses the command line, loads the configuration,
//! and launches the server threads.

#[macro_use]
extern crate log;

use backtrace::Backtrace;
use clap::{Arg, ArgAction, Command};
use config::PetrelConfig;
use petrel::Petrel;

fn main() {
    // custom panic hook to terminate the whole process after unwinding
    std::panic::set_hook(Box::new(|s| {
        error!("{}", s);
        eprintln!("{:?}", Backtrace::new());
        std::process::exit(101);
    }));

    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "A single-process HTTP/1.1 server built around a reactor core: \
            one event-loop thread, a worker thread pool, and bounded \
            resource pools. Serves static files from a resource directory \
            and handles form login backed by a relational database.",
        )
        .arg(
            Arg::new("CONFIG")
                .help("Server configuration file")
                .index(1),
        )
        .arg(
            Arg::new("print-config")
                .help("List all options in config")
                .long("config")
                .short('c')
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // load config from file
    let config = if let Some(file) = matches.get_one::<String>("CONFIG") {
        match PetrelConfig::load(file) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("unable to load config file: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Default::default()
    };

    if matches.get_flag("print-config") {
        config.print();
        std::process::exit(0);
    }

    if let Err(e) = config.validate() {
        eprintln!("invalid config: {}", e);
        std::process::exit(1);
    }

    // launch the server
    match Petrel::new(config) {
        Ok(petrel) => petrel.wait(),
        Err(e) => {
            eprintln!("error launching server: {}", e);
            std::process::exit(1);
        }
    }
}
