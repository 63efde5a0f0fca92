use std::path::PathBuf;

use metadata_nodes::exiftool::bridge::parse_tag_names;
use metadata_nodes::exiftool::{
    ExifToolBridge, ExifToolRequest, Operation, OutputFormat, StdCommandRunner,
};
use metadata_nodes::nodes::folder_selector::decode_image;
use metadata_nodes::nodes::{
    select_image_from_folder, FolderSelectRequest, Label, MetadataWriteRequest, MetadataWriter,
};
use metadata_nodes::settings::SettingsOverlay;
use metadata_nodes::{ImageBuffer, Settings};
use serde_json::json;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn main() -> CliResult<()> {
    init_tracing();

    let cli_args = std::env::args().skip(1).collect::<Vec<_>>();
    let rest = cli_args.iter().skip(1).cloned().collect::<Vec<_>>();
    match cli_args.first().map(String::as_str) {
        Some("load-folder") => run_load_folder_cli(rest),
        Some("save-metadata") => run_save_metadata_cli(rest),
        Some("exiftool") => run_exiftool_cli(rest),
        Some("-h" | "--help") | None => {
            print_usage();
            Ok(())
        }
        Some(unknown) => Err(std::io::Error::other(format!(
            "Unknown command: {unknown}\n\nUse --help for usage."
        ))
        .into()),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn wants_help(args: &[String]) -> bool {
    args.iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
}

fn missing_value(flag: &str) -> Box<dyn std::error::Error> {
    std::io::Error::other(format!("Missing value for {flag}")).into()
}

fn unknown_argument(arg: &str) -> Box<dyn std::error::Error> {
    std::io::Error::other(format!("Unknown argument: {arg}\n\nUse --help for usage.")).into()
}

fn resolve_settings(config: Option<&str>, overrides: &SettingsOverlay) -> CliResult<Settings> {
    let root = std::env::current_dir()?;
    Ok(Settings::resolve(&root, config, overrides)?)
}

fn image_summary(image: &ImageBuffer) -> serde_json::Value {
    let (height, width, channels) = image.shape();
    json!({ "shape": [height, width, channels] })
}

fn run_load_folder_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_load_folder_usage();
        return Ok(());
    }
    let request = parse_load_folder_cli_args(&args)?;
    let selection = select_image_from_folder(&request);

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "image": image_summary(&selection.image),
            "file_path": selection.file_path,
            "filename": selection.filename,
            "total_images": selection.total_images,
        }))?
    );
    eprintln!("{}", selection.debug_log);
    Ok(())
}

fn parse_load_folder_cli_args(args: &[String]) -> CliResult<FolderSelectRequest> {
    let mut folder = None::<PathBuf>;
    let mut request = FolderSelectRequest::new(PathBuf::new());
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            args.get(idx + 1).cloned().ok_or_else(|| missing_value(flag))
        };

        match flag {
            "--folder" => {
                folder = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--index" => {
                request.index = needs_value(i)?.trim().parse::<usize>()?;
                i += 2;
            }
            "--patterns" => {
                request.patterns = needs_value(i)?;
                i += 2;
            }
            "--sort-by" => {
                request.sort_by = needs_value(i)?.parse()?;
                i += 2;
            }
            "--sort-order" => {
                request.sort_order = needs_value(i)?.parse()?;
                i += 2;
            }
            "--recursive" => {
                request.recursive = true;
                i += 1;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }

    request.folder = folder.ok_or_else(|| std::io::Error::other("Missing required --folder"))?;
    Ok(request)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SaveMetadataCliArgs {
    input: PathBuf,
    config: Option<String>,
    request: MetadataWriteRequest,
}

fn run_save_metadata_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_save_metadata_usage();
        return Ok(());
    }
    let parsed = parse_save_metadata_cli_args(&args)?;
    let settings = resolve_settings(parsed.config.as_deref(), &SettingsOverlay::default())?;
    let image = ImageBuffer::from_dynamic(&decode_image(&parsed.input)?.image);

    let writer = MetadataWriter::new(settings.output_dir);
    match writer.save(&image, &parsed.request) {
        Ok(saved) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "file_path": saved.file_path }))?
            );
            eprintln!("{}", saved.debug_log);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.debug_log);
            Err(failure.into())
        }
    }
}

fn parse_save_metadata_cli_args(args: &[String]) -> CliResult<SaveMetadataCliArgs> {
    let mut input = None::<PathBuf>;
    let mut config = None::<String>;
    let mut request = MetadataWriteRequest::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            args.get(idx + 1).cloned().ok_or_else(|| missing_value(flag))
        };

        match flag {
            "--input" => {
                input = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--config" => {
                config = Some(needs_value(i)?);
                i += 2;
            }
            "--prefix" => {
                request.filename_prefix = needs_value(i)?;
                i += 2;
            }
            "--title" => {
                request.title = Some(needs_value(i)?);
                i += 2;
            }
            "--description" => {
                request.description = Some(needs_value(i)?);
                i += 2;
            }
            "--keywords" => {
                request.keywords = Some(needs_value(i)?);
                i += 2;
            }
            "--creator" => {
                request.creator = Some(needs_value(i)?);
                i += 2;
            }
            "--copyright" => {
                request.copyright = Some(needs_value(i)?);
                i += 2;
            }
            "--rating" => {
                request.rating = needs_value(i)?.trim().parse::<u8>()?;
                i += 2;
            }
            "--label" => {
                request.label = needs_value(i)?.parse::<Label>()?;
                i += 2;
            }
            "--custom-metadata" => {
                request.custom_metadata = Some(needs_value(i)?);
                i += 2;
            }
            "--output-dir" => {
                request.output_dir = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }

    let input = input.ok_or_else(|| std::io::Error::other("Missing required --input"))?;
    Ok(SaveMetadataCliArgs {
        input,
        config,
        request,
    })
}

#[derive(Debug, Clone, PartialEq)]
struct ExifToolCliArgs {
    config: Option<String>,
    overrides: SettingsOverlay,
    image: Option<PathBuf>,
    request: ExifToolRequest,
}

fn run_exiftool_cli(args: Vec<String>) -> CliResult<()> {
    if wants_help(&args) {
        print_exiftool_usage();
        return Ok(());
    }
    let mut parsed = parse_exiftool_cli_args(&args)?;
    let settings = resolve_settings(parsed.config.as_deref(), &parsed.overrides)?;
    if let Some(path) = parsed.image.as_ref() {
        parsed.request.image = Some(ImageBuffer::from_dynamic(&decode_image(path)?.image));
    }

    let bridge = ExifToolBridge::new(settings.exiftool, StdCommandRunner);
    match bridge.process(&parsed.request) {
        Ok(output) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "image": image_summary(&output.image),
                    "metadata": output.metadata,
                }))?
            );
            eprintln!("{}", output.debug_log);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure.debug_log);
            Err(failure.into())
        }
    }
}

fn parse_exiftool_cli_args(args: &[String]) -> CliResult<ExifToolCliArgs> {
    let mut config = None::<String>;
    let mut overrides = SettingsOverlay::default();
    let mut image = None::<PathBuf>;
    let mut request = ExifToolRequest::default();
    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        let needs_value = |idx: usize| -> CliResult<String> {
            args.get(idx + 1).cloned().ok_or_else(|| missing_value(flag))
        };

        match flag {
            "--config" => {
                config = Some(needs_value(i)?);
                i += 2;
            }
            "--exiftool" => {
                overrides.exiftool_path = Some(needs_value(i)?);
                i += 2;
            }
            "--timeout" => {
                overrides.exiftool_timeout_secs = Some(needs_value(i)?.trim().parse::<u64>()?);
                i += 2;
            }
            "--operation" => {
                request.operation = needs_value(i)?.parse::<Operation>()?;
                i += 2;
            }
            "--file" => {
                request.file_path = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--image" => {
                image = Some(PathBuf::from(needs_value(i)?));
                i += 2;
            }
            "--format" => {
                request.output_format = needs_value(i)?.parse::<OutputFormat>()?;
                i += 2;
            }
            "--group" => {
                request.group_filter = Some(needs_value(i)?);
                i += 2;
            }
            "--tag" => {
                request.tag_names.push(needs_value(i)?);
                i += 2;
            }
            "--tags" => {
                let raw = needs_value(i)?.replace(',', "\n");
                request.tag_names.extend(parse_tag_names(&raw));
                i += 2;
            }
            "--metadata" => {
                request.metadata_to_write = Some(needs_value(i)?);
                i += 2;
            }
            "--clear-existing" => {
                request.preserve_existing = false;
                i += 1;
            }
            "--include-binary" => {
                request.include_binary = true;
                i += 1;
            }
            "--extract-embedded" => {
                request.extract_embedded = true;
                i += 1;
            }
            unknown => return Err(unknown_argument(unknown)),
        }
    }

    Ok(ExifToolCliArgs {
        config,
        overrides,
        image,
        request,
    })
}

fn print_usage() {
    eprintln!(concat!(
        "Usage:\n",
        "  metadata-nodes load-folder --folder PATH [options]\n",
        "  metadata-nodes save-metadata --input IMAGE [options]\n",
        "  metadata-nodes exiftool (--file PATH | --image IMAGE) [options]\n\n",
        "Run a command with --help for its options.\n"
    ));
}

fn print_load_folder_usage() {
    eprintln!(
        concat!(
            "Usage:\n",
            "  metadata-nodes load-folder --folder PATH [--index N] [--patterns \"*.png,*.jpg\"] ",
            "[--sort-by name|date_modified|date_created|size] [--sort-order ascending|descending] ",
            "[--recursive]\n\n",
            "Defaults:\n",
            "  --index 0, --patterns \"*.png,*.jpg,*.jpeg\", --sort-by date_modified, --sort-order descending\n"
        )
    );
}

fn print_save_metadata_usage() {
    eprintln!(
        concat!(
            "Usage:\n",
            "  metadata-nodes save-metadata --input IMAGE [--prefix NAME] [--title T] [--description D] ",
            "[--keywords \"a, b\"] [--creator C] [--copyright C] [--rating 0-5] ",
            "[--label None|Red|Yellow|Green|Blue|Purple] [--custom-metadata JSON] ",
            "[--output-dir DIR] [--config PATH]\n\n",
            "Defaults:\n",
            "  output directory: output_dir from config/metadata-nodes.toml, METADATA_NODES_OUTPUT_DIR, or ./output\n"
        )
    );
}

fn print_exiftool_usage() {
    eprintln!(
        concat!(
            "Usage:\n",
            "  metadata-nodes exiftool (--file PATH | --image IMAGE) ",
            "[--operation \"Read All Metadata\"|\"Read Specific Tags\"|\"Write Metadata\"] ",
            "[--format \"Pretty JSON\"|\"Compact JSON\"|\"Human Readable\"] [--group GROUP] ",
            "[--tag NAME]... [--tags A,B] [--metadata JSON] [--clear-existing] ",
            "[--include-binary] [--extract-embedded] [--exiftool PATH] [--timeout SECS] [--config PATH]\n\n",
            "Defaults:\n",
            "  exiftool binary: first of /usr/local/bin, /opt/homebrew/bin, /usr/bin; timeout 30 s\n",
            "  environment: METADATA_NODES_EXIFTOOL, METADATA_NODES_EXIFTOOL_TIMEOUT_SECS\n"
        )
    );
}
