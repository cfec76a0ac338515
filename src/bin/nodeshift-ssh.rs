use clap::ArgMatches;
use nodeshift::cli::{exit_on_parse_error, ssh_command};
use nodeshift::{NodeshiftConfig, SshManager};

fn host(args: &ArgMatches) -> (String, u16) {
    let ip = args.get_one::<String>("ip").cloned().unwrap_or_default();
    let port = args.get_one::<u16>("port").copied().unwrap_or(22);
    (ip, port)
}

#[tokio::main]
async fn main() {
    nodeshift::logging::init();

    let matches = ssh_command()
        .try_get_matches()
        .unwrap_or_else(|e| exit_on_parse_error(e));

    let config = match NodeshiftConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let key_name = matches
        .get_one::<String>("key")
        .cloned()
        .unwrap_or_else(|| config.ssh.key_name.clone());
    let manager = SshManager::new(config.ssh);

    match matches.subcommand() {
        Some(("generate", _)) => {
            if let Err(e) = manager.generate_key(&key_name).await {
                eprintln!("❌ Key generation failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(("pubkey", _)) => match manager.public_key(&key_name) {
            Ok(key) => println!("{}", key),
            Err(e) => {
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        },
        Some(("connect", args)) => {
            let (ip, port) = host(args);
            match manager.connect(&key_name, &ip, port).await {
                Ok(status) if status.success() => {}
                Ok(status) => std::process::exit(status.code().unwrap_or(1)),
                Err(e) => {
                    eprintln!("❌ {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Some(("test", args)) => {
            let (ip, port) = host(args);
            if !manager.test_connection(&key_name, &ip, port).await {
                std::process::exit(1);
            }
        }
        _ => unreachable!("subcommand_required is set"),
    }
}
