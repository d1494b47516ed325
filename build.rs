// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn root_arg() -> Arg {
    Arg::new("root")
        .short('r')
        .long("root")
        .value_name("DIR")
        .help("Install root directory (overrides the configuration)")
}

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("Configuration file (default: <config dir>/packledger/config.json)")
}

fn build_cli() -> Command {
    Command::new("packledger")
        .version(env!("CARGO_PKG_VERSION"))
        .author("packledger contributors")
        .about("Install asset packages and track which package owns each file")
        .subcommand_required(false)
        .arg(config_arg())
        .arg(root_arg())
        .subcommand(
            Command::new("install")
                .about("Install a package from a .zip archive")
                .arg(Arg::new("archive").required(true).help("Path to the archive"))
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Package name in the ledger (default: installed folder name)"),
                )
                .arg(
                    Arg::new("overwrite")
                        .long("overwrite")
                        .action(ArgAction::SetTrue)
                        .help("Replace an existing folder with the same name"),
                )
                .arg(
                    Arg::new("merge")
                        .long("merge")
                        .action(ArgAction::SetTrue)
                        .help("Copy into an existing folder instead of replacing it (implies --overwrite)"),
                )
                .arg(
                    Arg::new("no_space_check")
                        .long("no-space-check")
                        .action(ArgAction::SetTrue)
                        .help("Skip the free-space estimate"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Take over files owned by other packages without asking"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package, or only some of its files")
                .arg(Arg::new("package").required(true).help("Package name to remove"))
                .arg(
                    Arg::new("files")
                        .num_args(0..)
                        .help("Files to remove (removes the whole package if omitted)"),
                ),
        )
        .subcommand(
            Command::new("query")
                .about("Query installed packages")
                .arg(Arg::new("pattern").help("Package name pattern (optional)"))
                .arg(
                    Arg::new("files")
                        .long("files")
                        .action(ArgAction::SetTrue)
                        .help("List the files each package owns"),
                ),
        )
        .subcommand(
            Command::new("conflicts")
                .about("Show which installed files an archive would take over")
                .arg(Arg::new("archive").required(true).help("Path to the archive"))
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Package name the archive would be installed as"),
                ),
        )
        .subcommand(
            Command::new("verify").about("Check the ledger for inconsistencies and missing files"),
        )
        .subcommand(
            Command::new("clear")
                .about("Forget every package and delete the ledger file (installed files stay)"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("packledger.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
