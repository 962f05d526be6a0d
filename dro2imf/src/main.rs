//! CLI tool to convert DRO capture files to IMF files.
use std::fs;
use std::io::{BufWriter, Write as _};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use snafu::Report;

use imfbinary::imf::ImfTags;
use imfbinary::{convert_dro_to_imf, ConvertOptions, Dro, ImfType, TagString};

/// DOSBox OPL capture to id Software Music Format converter
#[derive(Parser)]
#[command(name = "dro2imf")]
#[command(version)]
#[command(after_help = "\
IMF rates to use: 560 Hz for Commander Keen, 700 Hz for Wolfenstein 3D,
280 Hz for Duke Nukem II.

IMF tags are optional, but if given all three must be specified
(use \"\" to leave a field blank). Use them with Type-1 files.")]
struct Cli {
    /// The DOSBox capture to convert
    input: PathBuf,

    /// The output IMF file that will be created
    output: PathBuf,

    /// IMF playback rate in Hz
    #[arg(
        long,
        default_value_t = imfbinary::DEFAULT_IMF_RATE,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    rate: u16,

    /// Container variant: 0 (Commander Keen) or 1 (Wolfenstein 3D)
    #[arg(
        long = "type",
        value_name = "TYPE",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=1)
    )]
    imf_type: u8,

    /// Title, composer and remarks tags
    #[arg(long, num_args = 3, value_names = ["TITLE", "COMPOSER", "REMARKS"])]
    tags: Option<Vec<String>>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    let options = ConvertOptions {
        rate: cli.rate,
        imf_type: match cli.imf_type {
            0 => ImfType::Type0,
            _ => ImfType::Type1,
        },
    };

    let data = match fs::read(&cli.input) {
        Ok(data) => data,
        Err(_) => {
            eprintln!("Unable to open {}", cli.input.display());
            return ExitCode::from(2);
        }
    };

    // created before conversion so that a conversion failure still
    // maps to its own exit code; a failed run leaves the file behind
    // for the caller to dispose of
    let output = match fs::File::create(&cli.output) {
        Ok(file) => file,
        Err(_) => {
            eprintln!("Unable to create {}", cli.output.display());
            return ExitCode::from(3);
        }
    };

    let dro = match Dro::parse(&data) {
        Ok(dro) => dro,
        Err(e) => {
            eprintln!("{}", Report::from_error(e));
            return ExitCode::from(4);
        }
    };
    println!("Data is {} bytes long.", dro.header.data_length_bytes());

    let mut music = match convert_dro_to_imf(&dro, &options) {
        Ok(music) => music,
        Err(e) => {
            eprintln!("{}", Report::from_error(e));
            return ExitCode::from(4);
        }
    };

    if let Some(fields) = &cli.tags {
        if options.imf_type == ImfType::Type1 {
            music.tags = build_tags(fields);
        } else {
            println!("Warning: The selected IMF file format is Type-0. Thus, IMF tags are ignored.");
        }
    }

    let mut writer = BufWriter::new(output);
    if let Err(e) = music.write_to(&mut writer) {
        eprintln!("{}", Report::from_error(e));
        return ExitCode::from(4);
    }
    if let Err(e) = writer.flush() {
        eprintln!("Unable to write {}: {}", cli.output.display(), e);
        return ExitCode::from(4);
    }

    if let Some(tags) = &music.tags {
        println!("Set title to '{}'", tags.title);
        println!("Set composer to '{}'", tags.composer);
        println!("Set remarks to '{}'", tags.remarks);
    }
    println!("IMF Rate: {}Hz", cli.rate);
    println!("Type of IMF file: {}", options.imf_type);
    println!("Wrote {}", cli.output.display());
    ExitCode::SUCCESS
}

/// Validate the three tag fields,
/// dropping the whole block if any of them is rejected.
fn build_tags(fields: &[String]) -> Option<ImfTags> {
    let [title, composer, remarks] = fields else {
        return None;
    };
    Some(ImfTags {
        title: tag_field("Title", title)?,
        composer: tag_field("Composer", composer)?,
        remarks: tag_field("Remarks", remarks)?,
    })
}

fn tag_field(name: &str, value: &str) -> Option<TagString> {
    match TagString::try_from(value) {
        Ok(tag) => Some(tag),
        Err(e) => {
            eprintln!("ERROR: {name} field rejected ({e}), ignoring IMF tags.");
            None
        }
    }
}
