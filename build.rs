// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Package type argument shared by install, list and remove
fn kind_arg() -> Arg {
    Arg::new("kind")
        .value_name("TYPE")
        .required(true)
        .value_parser(["packages", "modules"])
        .help("Work on regular packages or on security modules")
}

fn patterns_arg(required: bool) -> Arg {
    Arg::new("patterns")
        .value_name("PATTERN")
        .num_args(1..)
        .required(required)
        .help("Glob patterns matched against package names, e.g. 'nb*'")
}

fn build_cli() -> Command {
    Command::new("pkgrecap")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Package transaction recaps, listings and lock arbitration as JSON lines")
        .subcommand_required(true)
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Report full error chains and raise diagnostics to debug"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_name("FILE")
                .help("Configuration file (default: /etc/pkgrecap/pkgrecap.toml)"),
        )
        .arg(
            Arg::new("state")
                .long("state")
                .global(true)
                .value_name("FILE")
                .help("Engine state file, overriding the configuration"),
        )
        .subcommand(
            Command::new("check-update")
                .about("Recap the available updates without applying them")
                .arg(patterns_arg(false)),
        )
        .subcommand(
            Command::new("info")
                .about("Show details about packages")
                .arg(patterns_arg(true)),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages or security modules")
                .arg(kind_arg())
                .arg(patterns_arg(true)),
        )
        .subcommand(
            Command::new("list")
                .about("List packages or security modules")
                .arg(
                    Arg::new("filter")
                        .value_name("FILTER")
                        .required(true)
                        .value_parser(["all", "installed", "available"])
                        .help("Which packages to list"),
                )
                .arg(kind_arg())
                .arg(patterns_arg(false))
                .arg(
                    Arg::new("show_hidden")
                        .long("show-hidden")
                        .action(ArgAction::SetTrue)
                        .help("Also show hidden security modules"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages or security modules")
                .arg(kind_arg())
                .arg(patterns_arg(true)),
        )
        .subcommand(
            Command::new("update")
                .about("Update packages, or the whole system when no pattern is given")
                .arg(patterns_arg(false)),
        )
        .subcommand(Command::new("last-updated").about("Show the date of the last system update"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("pkgrecap.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
