extern crate log;
extern crate pretty_env_logger;

use std::path::PathBuf;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

use clap::{arg, command, value_parser, ArgMatches, Command};

use ballot_ocr::keywords::unique_anchor_words;
use ballot_ocr::layout::LayoutDocument;
use ballot_ocr::layout_provider::PrecomputedLayoutProvider;
use ballot_ocr::recognize::{recognize_ballot, RecognizeBallotError, RecognizeOptions};
use ballot_ocr::templates::DirectoryTemplateRepository;

fn main() {
    pretty_env_logger::init_custom_env("LOG");

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("recognize", matches)) => run_recognize(matches),
        Some(("anchors", matches)) => run_anchors(matches),
        _ => unreachable!("subcommand is required"),
    }
}

fn run_recognize(matches: &ArgMatches) {
    let image_path = matches
        .get_one::<PathBuf>("image_path")
        .expect("image path is required");
    let templates_dir = matches
        .get_one::<PathBuf>("templates")
        .expect("templates directory is required");
    let layout_path = matches
        .get_one::<PathBuf>("layout")
        .expect("layout path is required");
    let timeout = matches
        .get_one::<u64>("timeout")
        .copied()
        .expect("timeout has a default");
    let debug = matches.get_flag("debug");

    let image_bytes = match std::fs::read(image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading ballot image: {}", e);
            exit(1);
        }
    };

    let options = RecognizeOptions {
        layout_deadline: Duration::from_secs(timeout),
        debug: debug.then(|| image_path.clone()),
        ..RecognizeOptions::default()
    };

    match recognize_ballot(
        Arc::from(image_bytes),
        Arc::new(PrecomputedLayoutProvider::new(layout_path)),
        &DirectoryTemplateRepository::new(templates_dir),
        &options,
    ) {
        Ok(recognition) => match serde_json::to_string_pretty(&recognition.result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                exit(1);
            }
        },
        Err(e @ RecognizeBallotError::NoSuitableTemplate(_)) => {
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}

fn run_anchors(matches: &ArgMatches) {
    let layout_path = matches
        .get_one::<PathBuf>("layout_path")
        .expect("layout path is required");
    let min_length = matches
        .get_one::<usize>("min_length")
        .copied()
        .expect("min length has a default");

    let document = match std::fs::read_to_string(layout_path)
        .map_err(|e| e.to_string())
        .and_then(|json| LayoutDocument::from_json(&json).map_err(|e| e.to_string()))
    {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error reading layout document: {}", e);
            exit(1);
        }
    };

    let words = unique_anchor_words(&document, min_length);
    let json = match serde_json::to_string_pretty(&words) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    match matches.get_one::<PathBuf>("output") {
        Some(output) => {
            if let Err(e) = std::fs::write(output, json) {
                eprintln!("Error writing {}: {}", output.display(), e);
                exit(1);
            }
            eprintln!("Wrote {} anchor words to {}", words.len(), output.display());
        }
        None => println!("{}", json),
    }
}

#[allow(clippy::cognitive_complexity)]
fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .subcommand(
            Command::new("recognize")
                .about("Detect marked checkboxes on a photographed ballot")
                .arg(
                    arg!(-t --templates <DIR> "Directory of ballot templates")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-l --layout <PATH> "Text layout JSON produced for the image")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(--timeout <SECS> "Seconds to wait for the text layout")
                        .value_parser(value_parser!(u64))
                        .default_value("30"),
                )
                .arg(arg!(-d --debug "Write debug images next to the ballot image"))
                .arg(
                    arg!(image_path: <IMAGE> "Path to the ballot image")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("anchors")
                .about("List words that occur exactly once in a reference layout")
                .arg(
                    arg!(--"min-length" <N> "Shortest word to keep")
                        .id("min_length")
                        .value_parser(value_parser!(usize))
                        .default_value("4"),
                )
                .arg(
                    arg!(-o --output <PATH> "Write the word list here instead of stdout")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(layout_path: <LAYOUT> "Path to the reference layout JSON")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_recognize_arguments() {
        let matches = cli()
            .try_get_matches_from(["ballot-ocr", "recognize", "-t", "templates", "-l", "ballot.json", "ballot.jpg"])
            .unwrap();
        let (name, matches) = matches.subcommand().unwrap();
        assert_eq!(name, "recognize");
        assert_eq!(matches.get_one::<u64>("timeout"), Some(&30));
        assert!(!matches.get_flag("debug"));
        assert_eq!(
            matches.get_one::<PathBuf>("image_path"),
            Some(&PathBuf::from("ballot.jpg"))
        );
    }

    #[test]
    fn test_anchors_arguments() {
        let matches = cli()
            .try_get_matches_from(["ballot-ocr", "anchors", "--min-length", "6", "ref.json"])
            .unwrap();
        let (_, matches) = matches.subcommand().unwrap();
        assert_eq!(matches.get_one::<usize>("min_length"), Some(&6));
        assert_eq!(matches.get_one::<PathBuf>("output"), None);
    }

    #[test]
    fn test_anchors_default_min_length() {
        let matches = cli()
            .try_get_matches_from(["ballot-ocr", "anchors", "ref.json"])
            .unwrap();
        let (_, matches) = matches.subcommand().unwrap();
        assert_eq!(
            matches.get_one::<usize>("min_length"),
            Some(&ballot_ocr::keywords::DEFAULT_MIN_ANCHOR_LENGTH)
        );
    }
}
