use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rsat_core::{
    init_logging, ArchiveExtractor, AssetComparator, AssetKind, HarnessConfig, LogFormat,
    RasterTool, SourceImage, TransformParams, TransformReplicator, VisualOptions,
};
use rsat_scenario::ResourceClient;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

fn cli() -> Command {
    let pairs = || {
        Arg::new("pairs")
            .num_args(0..)
            .value_name("KEY=VALUE")
            .help("Attribute table rows, e.g. \"Image: Width=200\"")
    };

    Command::new("rsat")
        .version(rsat_scenario::VERSION)
        .about("Resource server acceptance-test harness")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file (defaults to $RSAT_CONFIG)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("params")
                .about("Encode an attribute table as a matrix parameter segment")
                .arg(pairs()),
        )
        .subcommand(
            Command::new("replicate")
                .about("Apply a transformation to a source image with ImageMagick")
                .arg(
                    Arg::new("source")
                        .long("source")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(pairs()),
        )
        .subcommand(
            Command::new("compare")
                .about("Compare a received file with an expected one")
                .arg(
                    Arg::new("expected")
                        .long("expected")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("received")
                        .long("received")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .value_parser(["image", "epub", "binary", "text"])
                        .help("Asset kind; guessed from the expected file when absent"),
                )
                .arg(
                    Arg::new("ensure-compressed")
                        .long("ensure-compressed")
                        .action(ArgAction::SetTrue)
                        .help("Require the received image to be smaller"),
                ),
        )
        .subcommand(
            Command::new("extract")
                .about("Read a member out of an ePub")
                .arg(
                    Arg::new("archive")
                        .long("archive")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("member")
                        .long("member")
                        .required_unless_present("list"),
                )
                .arg(
                    Arg::new("list")
                        .long("list")
                        .action(ArgAction::SetTrue)
                        .help("List member names instead"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the member here instead of stdout"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("GET a path from the resource server")
                .arg(Arg::new("path").required(true))
                .arg(
                    Arg::new("from-byte")
                        .long("from-byte")
                        .value_parser(value_parser!(u64))
                        .help("Send Range: bytes=<n>-"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the body here"),
                ),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let format = if matches.get_flag("json-logs") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(matches.get_flag("verbose"), format);

    match run(&matches).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(2);
        }
    }
}

/// Run the chosen subcommand; `Ok(false)` is a failed verdict
async fn run(matches: &ArgMatches) -> Result<bool> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => HarnessConfig::from_toml_file(path)?
            .apply_env_overrides(|var| std::env::var(var).ok())?,
        None => HarnessConfig::load()?,
    };

    match matches.subcommand() {
        Some(("params", args)) => {
            let table = parse_pairs(args)?;
            let params = TransformParams::default_version().merge(TransformParams::decode(table));
            println!("{params}");
            Ok(true)
        }
        Some(("replicate", args)) => {
            let source = required_path(args, "source")?;
            let output = required_path(args, "output")?;
            let attributes: BTreeMap<String, String> = parse_pairs(args)?.into_iter().collect();

            let replicator = TransformReplicator::new(RasterTool::new(
                config.raster.clone(),
                config.tool_timeout(),
            ));
            let replicated = replicator
                .replicate_attributes(SourceImage::Path(&source), &attributes)
                .await?;
            std::fs::copy(replicated.path(), &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{}", output.display());
            Ok(true)
        }
        Some(("compare", args)) => {
            let expected = required_path(args, "expected")?;
            let received_path = required_path(args, "received")?;
            let kind = match args.get_one::<String>("kind").map(String::as_str) {
                Some("image") => AssetKind::Image,
                Some("epub") => AssetKind::Epub,
                Some("binary") => AssetKind::Binary,
                Some("text") => AssetKind::Text,
                Some(other) => bail!("unknown kind {other}"),
                None => AssetKind::from_path(&expected),
            };
            let received = std::fs::read(&received_path)
                .with_context(|| format!("reading {}", received_path.display()))?;

            let verdict = AssetComparator::from_config(&config)
                .compare(
                    kind,
                    &expected,
                    &received,
                    VisualOptions {
                        ensure_compressed: args.get_flag("ensure-compressed"),
                    },
                )
                .await?;
            if verdict.pass {
                match verdict.received_dimensions {
                    Some(dimensions) => println!("PASS ({dimensions})"),
                    None => println!("PASS"),
                }
            } else {
                println!("FAIL: {}", verdict.reason().unwrap_or_default());
            }
            Ok(verdict.pass)
        }
        Some(("extract", args)) => {
            let archive = required_path(args, "archive")?;
            if args.get_flag("list") {
                for name in ArchiveExtractor.member_names(&archive)? {
                    println!("{name}");
                }
                return Ok(true);
            }
            let member = args
                .get_one::<String>("member")
                .context("--member is required")?;
            let content = ArchiveExtractor.extract_member(&archive, member)?;
            match args.get_one::<PathBuf>("output") {
                Some(output) => std::fs::write(output, &content)
                    .with_context(|| format!("writing {}", output.display()))?,
                None => std::io::stdout().write_all(&content)?,
            }
            Ok(true)
        }
        Some(("fetch", args)) => {
            let path = args.get_one::<String>("path").context("path is required")?;
            let headers: Vec<(&str, String)> = args
                .get_one::<u64>("from-byte")
                .map(|n| ("Range", format!("bytes={n}-")))
                .into_iter()
                .collect();

            let response = ResourceClient::from_config(&config)?
                .get(path, &headers)
                .await?;
            let summary = serde_json::json!({
                "status": response.status,
                "headers": response.headers(),
                "bytes": response.body.len(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if let Some(output) = args.get_one::<PathBuf>("output") {
                std::fs::write(output, &response.body)
                    .with_context(|| format!("writing {}", output.display()))?;
            }
            Ok(response.status < 400)
        }
        _ => Ok(true),
    }
}

fn required_path(args: &ArgMatches, name: &str) -> Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .with_context(|| format!("--{name} is required"))
}

fn parse_pairs(args: &ArgMatches) -> Result<Vec<(String, String)>> {
    args.get_many::<String>("pairs")
        .into_iter()
        .flatten()
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => Ok((k.trim().to_string(), v.trim().to_string())),
            None => bail!("expected KEY=VALUE, got {pair}"),
        })
        .collect()
}
