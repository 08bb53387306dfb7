use std::{error::Error, fs, num::ParseIntError, path::PathBuf};

use clap::{Parser, Subcommand};
use prjcombine_re_segmaker::{FrameFilter, Segmaker};
use prjcombine_re_xilinx_iob::{
    device::IobDb,
    manifest::{Manifest, expected_vrefs, format_vref_csv, read_vref_csv},
    odelay::{OdelayManifest, derive_odelay_tags, sample_odelay},
    sample::sample_iobs,
    tags::{add_cfg_tags, derive_iob_tags},
    verilog::{emit_iob_top, emit_odelay_top},
};

#[derive(Debug, Parser)]
#[command(about = "Randomized HP IOB designs and their feature tags")]
struct Args {
    /// Directory with iob_tiles.csv, iobanks.txt, cmt_regions.csv and an
    /// optional device.toml.
    build: PathBuf,
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample an IOB design: writes top.v, params.json, params.csv and
    /// iobank_vref.csv.
    Generate {
        #[arg(long, env = "SEED", value_parser = parse_seed)]
        seed: u64,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Derive tags from params.json and the tool-reported iobank_vref.csv.
    Tags {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Sample an ODELAY design: writes top.v and params.json.
    OdelayGenerate {
        #[arg(long, env = "SEED", value_parser = parse_seed)]
        seed: u64,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Derive ODELAY tags from params.json.
    OdelayTags {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

fn parse_seed(s: &str) -> Result<u64, ParseIntError> {
    let s = s.trim();
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16)
}

fn generate(db: &IobDb, seed: u64, out: PathBuf, debug: u8) -> Result<(), Box<dyn Error>> {
    let manifest = sample_iobs(db, seed, debug);
    let mut top = String::new();
    emit_iob_top(&mut top, &manifest)?;
    fs::create_dir_all(&out)?;
    fs::write(out.join("top.v"), top)?;
    manifest.write(out.join("params.json"))?;
    fs::write(out.join("params.csv"), manifest.params_csv())?;
    fs::write(
        out.join("iobank_vref.csv"),
        format_vref_csv(&expected_vrefs(&manifest)),
    )?;
    clilog::info!(
        "seed {seed:016x}: {} with {} active sites",
        manifest.iostandard,
        manifest.active_sites().count()
    );
    Ok(())
}

fn tags(db: &IobDb, dir: PathBuf, debug: u8) -> Result<(), Box<dyn Error>> {
    let manifest = Manifest::from_file(dir.join("params.json"))?;
    let vrefs = read_vref_csv(dir.join("iobank_vref.csv"))?;
    let mut segmk = Segmaker::new();
    segmk.debug = debug;
    let summary = derive_iob_tags(db, &manifest, &vrefs, debug, &mut segmk);
    clilog::info!("{} IOB tags", segmk.len());
    segmk
        .compile(db.settings.frame_filter())
        .write(dir.join("segdata_iob.txt"), true)?;

    let mut segmk = Segmaker::new();
    segmk.debug = debug;
    add_cfg_tags(db, summary, &mut segmk);
    segmk
        .compile(FrameFilter::All)
        .write(dir.join("segdata_cfg.txt"), true)?;
    Ok(())
}

fn odelay_generate(db: &IobDb, seed: u64, out: PathBuf, debug: u8) -> Result<(), Box<dyn Error>> {
    let manifest = sample_odelay(db, seed, debug);
    let mut top = String::new();
    emit_odelay_top(&mut top, &manifest)?;
    fs::create_dir_all(&out)?;
    fs::write(out.join("top.v"), top)?;
    manifest.write(out.join("params.json"))?;
    clilog::info!(
        "seed {seed:016x}: {} outputs over {} tiles",
        manifest.num_outputs,
        manifest.num_tiles
    );
    Ok(())
}

fn odelay_tags(dir: PathBuf, debug: u8) -> Result<(), Box<dyn Error>> {
    let manifest = OdelayManifest::from_file(dir.join("params.json"))?;
    let mut segmk = Segmaker::new();
    segmk.debug = debug;
    derive_odelay_tags(&manifest, &mut segmk);
    clilog::info!("{} ODELAY tags", segmk.len());
    segmk
        .compile(FrameFilter::All)
        .write(dir.join("segdata_odelay.txt"), true)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    clilog::init_stderr_color_debug();
    let args = Args::parse();
    let timer = clilog::stimer!("iob_fuzz");
    let db = IobDb::from_dir(&args.build)?;
    match args.command {
        Command::Generate { seed, out } => generate(&db, seed, out, args.debug)?,
        Command::Tags { dir } => tags(&db, dir, args.debug)?,
        Command::OdelayGenerate { seed, out } => odelay_generate(&db, seed, out, args.debug)?,
        Command::OdelayTags { dir } => odelay_tags(dir, args.debug)?,
    }
    clilog::finish!(timer);
    Ok(())
}
