use clap::Parser;
use docker_layer_digest::*;
use std::path::PathBuf;

/// Print the registry digests of the layers of a local docker image
#[derive(Debug, Parser)]
#[command(version)]
struct Opt {
    /// Image reference, e.g. `redis:7`
    #[arg(required_unless_present = "archive")]
    image: Option<String>,

    /// Digest an existing `docker save` tarball instead of exporting the image
    #[arg(short = 'a', long = "archive")]
    archive: Option<PathBuf>,

    /// Pull the image before exporting it
    #[arg(long = "pull", conflicts_with = "archive")]
    pull: bool,

    /// Platform to pull, e.g. `linux/amd64`
    #[arg(long = "platform", requires = "pull")]
    platform: Option<String>,

    /// Directory for intermediate files, the working directory if not set
    #[arg(long = "scratch-dir")]
    scratch_dir: Option<PathBuf>,

    /// docker or podman executable, looked up on PATH if not set
    #[arg(long = "engine")]
    engine: Option<PathBuf>,

    /// gzip compression level used when recompressing layers
    #[arg(
        long = "level",
        default_value_t = 6,
        value_parser = clap::value_parser!(u32).range(0..=9)
    )]
    level: u32,

    /// Print digests as `sha256:<hex>`
    #[arg(long = "prefix")]
    prefix: bool,

    /// Print digests as a JSON array
    #[arg(long = "json")]
    json: bool,
}

fn main() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run(Opt::parse()) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(opt: Opt) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let options = Options {
        scratch_dir: opt.scratch_dir,
        compression: CompressionProfile {
            level: opt.level,
            ..Default::default()
        },
    };
    let digests = match (&opt.archive, &opt.image) {
        (Some(archive), _) => layer_digests_from_archive(archive, &options)?,
        (None, Some(image)) => {
            let engine = match &opt.engine {
                Some(path) => CliEngine::with_executable(path),
                None => CliEngine::detect()?,
            };
            if opt.pull {
                pull_and_extract_registry_layer_digests(
                    &engine,
                    image,
                    opt.platform.as_deref(),
                    &options,
                )?
            } else {
                extract_registry_layer_digests_with(&engine, image, &options)?
            }
        }
        (None, None) => unreachable!("clap requires an image or an archive"),
    };

    print!("{}", render(&digests, opt.prefix, opt.json)?);
    Ok(())
}

fn render(digests: &[LayerDigest], prefix: bool, json: bool) -> serde_json::Result<String> {
    if json {
        let mut out = if prefix {
            let prefixed: Vec<String> = digests.iter().map(|d| d.to_registry_digest()).collect();
            serde_json::to_string_pretty(&prefixed)?
        } else {
            serde_json::to_string_pretty(digests)?
        };
        out.push('\n');
        return Ok(out);
    }
    Ok(digests
        .iter()
        .map(|d| {
            if prefix {
                format!("{}\n", d.to_registry_digest())
            } else {
                format!("{}\n", d)
            }
        })
        .collect())
}
