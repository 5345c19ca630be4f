use anyhow::*;
use std::result::Result::Ok;
use log::*;
use mdlx::object::Animated;
use mdlx::{load_model, ArchiveStack, DirectoryArchive, Model, Playback};
use structopt::StructOpt;

use std::fs;
use std::path::{Path, PathBuf};

mod descriptor;

#[derive(Debug, StructOpt)]
#[structopt(name = "mdlx", about = "converts and inspects MDX/MDL models")]
struct Opt {
    /// Configuration file
    #[structopt(short, long, parse(from_os_str), default_value = "mdlx.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Re-encodes a model, picking the format from the output extension
    Convert {
        input: String,
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Lists the sequences and animated tracks of a model
    Info { input: String },
    /// Evaluates every animated property at a point of a sequence
    Sample {
        input: String,
        #[structopt(short, long, default_value = "0")]
        sequence: String,
        #[structopt(short, long, default_value = "0")]
        time: i32,
        /// Time on the global sequence clock
        #[structopt(short, long, default_value = "0")]
        elapsed: i32,
    },
}

fn load_config(path: &Path) -> descriptor::Config {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => {
            debug!("no config at {}", path.display());
            return Default::default();
        }
    };
    match toml::from_str(&data) {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to parse config file: {}", e);
            Default::default()
        }
    }
}

/// Reads `input` from disk, falling back to the configured archives.
fn load(input: &str, config: &descriptor::Config) -> Result<Model> {
    let path = Path::new(input);
    if path.is_file() {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .context("input has no file name")?
            .to_string_lossy();
        return load_model(&DirectoryArchive::new(dir), &name)?
            .with_context(|| format!("failed to open {}", input));
    }

    let mut stack = ArchiveStack::new();
    for root in &config.archive_paths {
        stack.push(Box::new(DirectoryArchive::new(root)));
    }
    load_model(&stack, input)?.with_context(|| format!("{} is in none of the archives", input))
}

fn convert(model: &mut Model, output: &Path, config: &descriptor::Config) -> Result<()> {
    if let Some(version) = config.format_version {
        model.version = version;
    }
    let extension = output
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    let data = match extension.as_deref() {
        Some("mdx") => model.to_mdx()?,
        Some("mdl") => model.to_mdl().into_bytes(),
        _ => bail!("{} is neither .mdx nor .mdl", output.display()),
    };
    fs::write(output, data).context("failed to write output")?;
    info!("wrote {}", output.display());
    Ok(())
}

fn info(model: &Model) {
    println!("version {}", model.version);
    for (i, seq) in model.sequences.iter().enumerate() {
        println!(
            "sequence {} {:?}: {}..{}{}",
            i,
            seq.name,
            seq.start,
            seq.end,
            if seq.is_looping() { "" } else { " (non-looping)" }
        );
    }
    for (i, duration) in model.global_sequences.iter().enumerate() {
        println!("global sequence {}: {}", i, duration);
    }
    for timeline in model.timelines() {
        println!(
            "{:?} track: {} keys, {}{}",
            timeline.property(),
            timeline.len(),
            timeline.interpolation().keyword(),
            timeline
                .global_sequence()
                .map(|id| format!(", global sequence {}", id))
                .unwrap_or_default()
        );
    }
}

fn sample(model: &Model, sequence: &str, time: i32, elapsed: i32) -> Result<()> {
    let index = match sequence.parse::<usize>() {
        Ok(index) => index,
        Err(_) => {
            model
                .sequence(sequence)
                .with_context(|| format!("no sequence named {:?}", sequence))?
                .0
        }
    };
    let seq = model
        .sequences
        .get(index)
        .with_context(|| format!("no sequence {}", index))?;
    let ctx = Playback::for_sequence(model, index)
        .context("no such sequence")?
        .at(time)
        .with_elapsed(elapsed);

    for (m, material) in model.materials.iter().enumerate() {
        for (l, layer) in material.layers.iter().enumerate() {
            println!(
                "material {} layer {}: alpha {}, texture {}",
                m,
                l,
                layer.alpha_at(&ctx)?,
                layer.texture_id_at(&ctx)?
            );
        }
    }
    for (i, anim) in model.texture_animations.iter().enumerate() {
        println!(
            "texture animation {}: translation {:?}, scaling {:?}",
            i,
            anim.translation_at(&ctx)?,
            anim.scaling_at(&ctx)?
        );
    }
    for (i, anim) in model.geoset_animations.iter().enumerate() {
        println!(
            "geoset animation {}: alpha {}, color {:?}",
            i,
            anim.alpha_at(&ctx)?,
            anim.color_at(&ctx)?
        );
    }
    for event in &model.event_objects {
        let frames: Vec<_> = event.frames_between(seq.start, seq.end).collect();
        println!(
            "event {:?}: translation {:?}, {} tracks, fires at {:?}",
            event.node.name,
            event.node.translation_at(&ctx)?,
            event.timelines().len(),
            frames
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    info!("starting up");

    let opt = Opt::from_args();
    let config = load_config(&opt.config);
    debug!("{:?}", config);

    match opt.cmd {
        Command::Convert { input, output } => {
            let mut model = load(&input, &config)?;
            convert(&mut model, &output, &config)?;
        }
        Command::Info { input } => info(&load(&input, &config)?),
        Command::Sample {
            input,
            sequence,
            time,
            elapsed,
        } => sample(&load(&input, &config)?, &sequence, time, elapsed)?,
    }
    Ok(())
}
