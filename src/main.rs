use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use structopt::StructOpt;
use svg2tvg::{decode::decode, Bound, Conversion, Diagnostics, Support};
use tracing::{info, Level};

/// Convert SVG documents into TinyVG files
#[derive(StructOpt)]
#[structopt(name = "svg2tvg")]
struct Options {
    /// Directory receiving the converted files, defaults to next to each input
    #[structopt(short, long)]
    output: Option<PathBuf>,

    /// Print the text form of every converted file
    #[structopt(long)]
    dump: bool,

    /// Log retries and recovered problems
    #[structopt(short, long)]
    verbose: bool,

    /// Files, directories scanned for `*.svg`, or glob patterns
    #[structopt(required = true)]
    inputs: Vec<String>,
}

#[derive(Debug, Default)]
struct Totals {
    processed: usize,
    partial: usize,
    failed: usize,
    input_bytes: u64,
    output_bytes: u64,
    diagnostics: Diagnostics,
}

struct Converted {
    input_bytes: u64,
    bound: Bound,
    conversion: Conversion,
}

struct Report {
    input_bytes: u64,
    output_bytes: u64,
    support: Support,
    diagnostics: Diagnostics,
}

fn main() -> Result<()> {
    let opts = Options::from_args();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if opts.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .init();

    let totals = run(&opts)?;
    print_summary(&totals);

    Ok(())
}

/// Converts every input. Returns early on internal errors and on failures to write
/// output; bad documents are only tallied.
fn run(opts: &Options) -> Result<Totals> {
    if let Some(dir) = &opts.output {
        fs::create_dir_all(dir).wrap_err("failed to create output directory")?;
    }

    let mut totals = Totals::default();

    for path in collect_inputs(&opts.inputs)? {
        let converted = match convert_file(&path) {
            Ok(converted) => converted,
            Err(err) => {
                let internal = err
                    .downcast_ref::<svg2tvg::Error>()
                    .map_or(false, svg2tvg::Error::is_internal);
                if internal {
                    return Err(err);
                }

                totals.failed += 1;
                for (depth, cause) in err.chain().enumerate() {
                    eprintln!("{:width$}{}", "", cause, width = depth);
                }
                continue;
            }
        };

        let report = write_output(&path, converted, opts)?;

        totals.processed += 1;
        if report.support == Support::Partial {
            totals.partial += 1;
        }
        totals.input_bytes += report.input_bytes;
        totals.output_bytes += report.output_bytes;
        totals.diagnostics.merge(&report.diagnostics);
    }

    Ok(totals)
}

fn collect_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        let path = Path::new(input);

        let pattern = if path.is_dir() {
            format!("{}/*.svg", glob::Pattern::escape(input))
        } else if input.contains(|c: char| matches!(c, '*' | '?' | '[')) {
            input.clone()
        } else {
            paths.push(path.to_owned());
            continue;
        };

        for entry in glob::glob(&pattern)? {
            paths.push(entry?);
        }
    }

    Ok(paths)
}

fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    match (output, input.file_name()) {
        (Some(dir), Some(name)) => dir.join(name).with_extension("tvg"),
        _ => input.with_extension("tvg"),
    }
}

fn convert_file(path: &Path) -> Result<Converted> {
    let text = fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;

    let bound = svg2tvg::parse_svg(&text)
        .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
    let conversion = svg2tvg::convert(&bound.document)
        .wrap_err_with(|| format!("failed to convert {}", path.display()))?;

    Ok(Converted {
        input_bytes: text.len() as u64,
        bound,
        conversion,
    })
}

fn write_output(path: &Path, converted: Converted, opts: &Options) -> Result<Report> {
    let Converted {
        input_bytes,
        bound,
        conversion,
    } = converted;

    let target = output_path(path, opts.output.as_deref());
    fs::write(&target, &conversion.bytes)
        .wrap_err_with(|| format!("failed to write {}", target.display()))?;

    if opts.dump {
        let image = decode(&conversion.bytes)
            .wrap_err_with(|| format!("encoder output for {} does not decode", path.display()))?;
        image.render_text(&mut std::io::stdout().lock())?;
    }

    for note in &bound.notes {
        info!(path = %path.display(), "{}", note);
    }

    let output_bytes = conversion.bytes.len() as u64;

    println!(
        "{:<40} {:>8} -> {:>7} bytes {:>6.1}%  scale 1/{}",
        path.display(),
        input_bytes,
        output_bytes,
        ratio(output_bytes, input_bytes),
        1u32 << conversion.scale,
    );

    Ok(Report {
        input_bytes,
        output_bytes,
        support: bound.support,
        diagnostics: conversion.diagnostics,
    })
}

fn ratio(output: u64, input: u64) -> f64 {
    if input == 0 {
        return 0.0;
    }

    100.0 * output as f64 / input as f64
}

fn print_summary(totals: &Totals) {
    println!(
        "{} documents converted, of which {} are not fully supported, {} failed",
        totals.processed, totals.partial, totals.failed
    );
    println!(
        "{} bytes of svg became {} bytes of tvg ({:.1}%)",
        totals.input_bytes,
        totals.output_bytes,
        ratio(totals.output_bytes, totals.input_bytes)
    );

    let diagnostics = &totals.diagnostics;
    if diagnostics.is_clean() {
        return;
    }

    println!(
        "{} warnings, {} shapes skipped",
        diagnostics.warnings, diagnostics.skipped_shapes
    );
    for (key, count) in &diagnostics.unsupported_keys {
        println!("  unsupported style key {:<24} {:>6}", key, count);
    }
    for (value, count) in &diagnostics.unsupported_values {
        println!("  unsupported style value {:<22} {:>6}", value, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RECT: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="16" height="16"><rect width="4" height="4" fill="#f00"/></svg>"##;

    fn options(inputs: &[&Path], output: Option<&Path>) -> Options {
        Options {
            output: output.map(Path::to_owned),
            dump: false,
            verbose: false,
            inputs: inputs
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        }
    }

    #[test]
    fn directories_expand_to_sorted_svg_files() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.svg", "a.svg", "notes.txt"] {
            fs::write(tmp.path().join(name), RECT).unwrap();
        }

        let paths = collect_inputs(&[tmp.path().display().to_string()]).unwrap();

        assert_eq!(
            paths,
            vec![tmp.path().join("a.svg"), tmp.path().join("b.svg")]
        );
    }

    #[test]
    fn bad_documents_are_counted_and_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.svg"), "<svg").unwrap();
        fs::write(tmp.path().join("b.svg"), RECT).unwrap();

        let totals = run(&options(&[tmp.path()], None)).unwrap();

        assert_eq!((totals.processed, totals.failed), (1, 1));
        assert!(tmp.path().join("b.tvg").is_file());
    }

    #[test]
    fn write_failures_end_the_batch() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.svg");
        fs::write(&input, RECT).unwrap();
        // a directory where the output file should go
        fs::create_dir(tmp.path().join("a.tvg")).unwrap();

        let err = run(&options(&[input.as_path()], None)).unwrap_err();

        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }
}
