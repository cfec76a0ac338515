use clap::error::ErrorKind;
use clap::{value_parser, Arg, Command};

pub fn run_command() -> Command {
    Command::new("nodeshift-run")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Replay a JSON task file or run ad-hoc commands")
        .arg(
            Arg::new("target")
                .required(true)
                .value_name("TASK_FILE_OR_COMMAND")
                .help("Path to a .json task file, or commands joined with '&&'"),
        )
        .after_help(
            "Examples:\n  nodeshift-run ~/agent-zero/configs/nodeshift_setup.json\n  nodeshift-run 'nvidia-smi'\n  nodeshift-run 'docker ps && nvidia-smi'",
        )
}

fn host_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("ip").required(true).help("Remote host address"))
        .arg(
            Arg::new("port")
                .required(true)
                .value_parser(value_parser!(u16))
                .help("Remote SSH port"),
        )
}

pub fn ssh_command() -> Command {
    Command::new("nodeshift-ssh")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Provision an SSH key pair and reach NodeShift hosts with it")
        .subcommand_required(true)
        .arg(
            Arg::new("key")
                .long("key")
                .short('k')
                .global(true)
                .value_name("NAME")
                .help("Key pair name inside the SSH directory (default from config: nodeshift_auto)"),
        )
        .subcommand(Command::new("generate").about("Create the key pair if it does not exist"))
        .subcommand(Command::new("pubkey").about("Print the public key"))
        .subcommand(host_args(
            Command::new("connect").about("Open an interactive session as root@<ip>"),
        ))
        .subcommand(host_args(
            Command::new("test").about("Check that a batch-mode login succeeds"),
        ))
}

/// Argument problems exit with 1; `--help` and `--version` exit 0.
pub fn exit_code(err: &clap::Error) -> i32 {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

pub fn exit_on_parse_error(err: clap::Error) -> ! {
    // clap renders usage into the error message for argument problems.
    let _ = err.print();
    std::process::exit(exit_code(&err));
}
