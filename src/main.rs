use clap::{value_parser, Arg, ArgMatches, Command};
use log::LevelFilter;
use scam_detector::judgment::{AnthropicClient, ModelEvaluator, ScamEvaluator};
use scam_detector::source::{parse_message, MaildirSource};
use scam_detector::{Config, EmailRecord, RuleBasedDetector, ScoringOrchestrator};
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("scam-detector")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scores emails for scam/phishing likelihood with rule heuristics and a model judgment")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/scam-detector.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Write a default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Score a single email given on the command line or as a file")
                .action(clap::ArgAction::SetTrue)
                .conflicts_with("scan"),
        )
        .arg(
            Arg::new("subject")
                .long("subject")
                .value_name("TEXT")
                .help("Subject of the email to check"),
        )
        .arg(
            Arg::new("sender")
                .long("sender")
                .value_name("ADDRESS")
                .help("Sender of the email to check"),
        )
        .arg(
            Arg::new("body")
                .long("body")
                .value_name("TEXT")
                .help("Body of the email to check"),
        )
        .arg(
            Arg::new("email-file")
                .long("email-file")
                .value_name("FILE")
                .help("Raw RFC 822 message to check instead of --subject/--sender/--body")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("rules-only")
                .long("rules-only")
                .help("With --check, run only the rule-based detector (no API call)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan")
                .long("scan")
                .value_name("MAILBOX")
                .help("Score the most recent messages of a Maildir or directory of .eml files")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("count")
                .short('n')
                .long("count")
                .value_name("N")
                .help("Number of recent messages to scan")
                .value_parser(value_parser!(usize)),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/scam-detector.yaml");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("test-config") {
        match RuleBasedDetector::new(config.heuristics.clone()) {
            Ok(_) => println!("Configuration OK: all heuristic patterns compiled."),
            Err(e) => {
                eprintln!("Configuration invalid: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    if matches.get_flag("check") {
        run_check(&config, &matches).await;
    } else if let Some(mailbox) = matches.get_one::<String>("scan") {
        let count = matches
            .get_one::<usize>("count")
            .copied()
            .unwrap_or(config.batch.default_count);
        run_scan(&config, mailbox, count).await;
    } else {
        eprintln!("Nothing to do: pass --check or --scan MAILBOX (see --help)");
        process::exit(2);
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path)
    } else {
        log::warn!("Configuration file '{path}' not found, using default configuration");
        Ok(Config::default())
    }
}

fn generate_default_config(path: &str) {
    match Config::default().to_file(path) {
        Ok(()) => println!("Default configuration written to: {path}"),
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn build_orchestrator(config: &Config) -> anyhow::Result<ScoringOrchestrator> {
    let client = Arc::new(AnthropicClient::from_env(&config.judgment)?);
    let evaluator: Arc<dyn ScamEvaluator> =
        Arc::new(ModelEvaluator::new(client, config.judgment.scam_threshold));
    ScoringOrchestrator::from_config(config, evaluator)
}

fn email_from_args(config: &Config, matches: &ArgMatches) -> anyhow::Result<EmailRecord> {
    let max_body_chars = config.batch.max_body_chars;

    if let Some(path) = matches.get_one::<String>("email-file") {
        let raw = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Error reading email file {path}: {e}"))?;
        return Ok(parse_message(&raw, max_body_chars)?);
    }

    let arg = |name: &str| {
        matches
            .get_one::<String>(name)
            .cloned()
            .unwrap_or_default()
    };
    Ok(EmailRecord::new(
        arg("subject"),
        arg("sender"),
        arg("body"),
        max_body_chars,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing result: {e}");
            process::exit(1);
        }
    }
}

async fn run_check(config: &Config, matches: &ArgMatches) {
    let email = match email_from_args(config, matches) {
        Ok(email) => email,
        Err(e) => {
            eprintln!("{e:#}");
            process::exit(1);
        }
    };

    if matches.get_flag("rules-only") {
        match RuleBasedDetector::new(config.heuristics.clone()) {
            Ok(detector) => print_json(&detector.analyze_record(&email)),
            Err(e) => {
                eprintln!("Error compiling heuristics: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let orchestrator = match build_orchestrator(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{e:#}");
            process::exit(1);
        }
    };

    match orchestrator.analyze_single(&email).await {
        Ok(verdict) => print_json(&verdict),
        Err(e) => {
            print_json(&serde_json::json!({ "error": e.to_string() }));
            process::exit(1);
        }
    }
}

async fn run_scan(config: &Config, mailbox: &str, count: usize) {
    let orchestrator = match build_orchestrator(config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{e:#}");
            process::exit(1);
        }
    };

    let source = MaildirSource::new(mailbox, config.batch.max_body_chars);
    match orchestrator.scan(&source, count).await {
        Ok(entries) => print_json(&serde_json::json!({ "results": entries })),
        Err(e) => {
            log::error!("{e}");
            print_json(&serde_json::json!({ "error": e.to_string() }));
            process::exit(1);
        }
    }
}
