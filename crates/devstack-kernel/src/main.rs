use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use devstack_bootstrap::extract_units;
use devstack_kernel::blueprint::{assemble_boot_script, build_environment};
use devstack_kernel::config::DevStackConfig;
use devstack_kernel::definition::StackDefinition;
use devstack_kernel::engine::TemplateSynthesizer;
use devstack_kernel::logging::init_tracing;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "devstack.toml";

fn cli() -> Command {
    Command::new("devstack")
        .version(devstack_kernel::VERSION)
        .about("Single-host remote development environment")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Config file (default: <base>/devstack.toml when present)"),
        )
        .arg(
            Arg::new("base")
                .long("base")
                .global(true)
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Directory the template and source paths are relative to"),
        )
        .arg(
            Arg::new("stack-name")
                .long("stack-name")
                .global(true)
                .help("Override the stack name"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .subcommand(
            Command::new("assemble")
                .about("Assemble the boot script")
                .arg(
                    Arg::new("template")
                        .long("template")
                        .value_parser(value_parser!(PathBuf))
                        .help("Script template"),
                )
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .value_parser(value_parser!(PathBuf))
                        .help("Source directory"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the script here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("synth")
                .about("Write the CloudFormation template")
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .short('o')
                        .default_value("cdk.out")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output directory"),
                ),
        )
        .subcommand(
            Command::new("unpack")
                .about("Reconstruct the embedded files of an assembled script")
                .arg(
                    Arg::new("script")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Assembled script"),
                )
                .arg(
                    Arg::new("out-dir")
                        .long("out-dir")
                        .short('o')
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to write the files into"),
                ),
        )
        .subcommand(
            Command::new("describe")
                .about("Summarize the stack definition")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the full definition as JSON"),
                ),
        )
}

fn load_config(matches: &ArgMatches, base: &Path) -> Result<DevStackConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DevStackConfig::load(path)?,
        None => {
            let path = base.join(DEFAULT_CONFIG);
            if path.is_file() {
                DevStackConfig::load(&path)?
            } else {
                DevStackConfig::default()
            }
        }
    };
    if let Some(name) = matches.get_one::<String>("stack-name") {
        config = config.with_stack_name(name);
    }
    Ok(config)
}

fn print_summary(definition: &StackDefinition) {
    println!("stack        {}", definition.name());
    println!("fingerprint  {}", definition.fingerprint());
    for (id, resource) in definition.resources() {
        println!("{:<12} {id}", resource.kind());
    }
    for id in definition.networks().keys() {
        println!("network      {id}");
    }
    for (id, identity) in definition.identities() {
        let policies: Vec<&str> = identity.policy_names().map(|p| p.as_str()).collect();
        println!("identity     {id} [{}]", policies.join(", "));
    }
    if let Some(host) = definition.host() {
        println!(
            "host         {} ({}, {} byte boot script)",
            host.id,
            host.spec.instance_type,
            host.spec.boot_script.len()
        );
    }
    for name in definition.outputs().keys() {
        println!("output       {name}");
    }
}

async fn run(matches: ArgMatches) -> Result<()> {
    let base = matches
        .get_one::<PathBuf>("base")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let mut config = load_config(&matches, &base)?;

    match matches.subcommand() {
        Some(("assemble", sub)) => {
            if let Some(template) = sub.get_one::<PathBuf>("template") {
                config.bootstrap.template = template.clone();
            }
            if let Some(sources) = sub.get_one::<PathBuf>("sources") {
                config.bootstrap.sources = sources.clone();
            }
            let (assembled, _) =
                assemble_boot_script(&config, &base).context("failed to assemble boot script")?;
            match sub.get_one::<PathBuf>("out") {
                Some(out) => std::fs::write(out, assembled.text())
                    .with_context(|| format!("failed to write {}", out.display()))?,
                None => print!("{}", assembled.text()),
            }
        }
        Some(("synth", sub)) => {
            let out_dir = sub
                .get_one::<PathBuf>("out-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("cdk.out"));
            let (_, definition) =
                build_environment(&config, &base).context("failed to compose the stack")?;
            let engine = TemplateSynthesizer::new(out_dir);
            let deployment = definition
                .deploy(&engine)
                .await
                .context("failed to synthesize template")?;
            println!("{}", serde_json::to_string_pretty(&deployment.outputs)?);
        }
        Some(("unpack", sub)) => {
            let script_path = sub
                .get_one::<PathBuf>("script")
                .context("missing script argument")?;
            let out_dir = sub
                .get_one::<PathBuf>("out-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            let script = std::fs::read_to_string(script_path)
                .with_context(|| format!("failed to read {}", script_path.display()))?;
            let files = extract_units(&script, &config.bootstrap.delimiter)
                .context("failed to parse script")?;
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            for file in &files {
                let path = out_dir.join(&file.name);
                std::fs::write(&path, &file.content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("{}", path.display());
            }
            tracing::info!(files = files.len(), "unpacked script");
        }
        Some(("describe", sub)) => {
            let (_, definition) =
                build_environment(&config, &base).context("failed to compose the stack")?;
            if sub.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&definition)?);
            } else {
                print_summary(&definition);
            }
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("verbose"), matches.get_flag("log-json"))?;
    run(matches).await
}
