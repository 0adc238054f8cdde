use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use proposal_analyzer::{
    config::Config,
    logging,
    processing::{AnalysisResult, AnalysisService, QuestionSet, UploadedFile, loader::DocumentFormat},
};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "analyze-file",
    about = "Run the proposal analysis pipeline against local documents"
)]
struct Cli {
    /// Document to analyze, or a directory whose supported documents are analyzed in turn.
    path: PathBuf,
    /// Question to ask instead of the default set. Repeat for several questions.
    #[arg(long = "question", short = 'q')]
    questions: Vec<String>,
    /// Emit compact JSON instead of pretty-printed output.
    #[arg(long)]
    compact: bool,
}

#[derive(Serialize)]
struct FileReport {
    file: String,
    #[serde(flatten)]
    result: AnalysisResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_cli_tracing();

    let config = Config::from_env().context("failed to load configuration from environment")?;
    let service = AnalysisService::from_config(&config)
        .context("failed to initialize provider clients")?;
    let questions = if cli.questions.is_empty() {
        None
    } else {
        Some(QuestionSet::new(cli.questions.clone())?)
    };

    let files = collect_documents(&cli.path)?;
    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let result = service
            .run(UploadedFile::new(filename, bytes), questions.clone())
            .await;
        reports.push(FileReport {
            file: path.display().to_string(),
            result,
        });
    }

    let output = if cli.path.is_dir() {
        render(&reports, cli.compact)?
    } else {
        render(&reports[0].result, cli.compact)?
    };
    println!("{output}");
    Ok(())
}

/// Resolve `path` to the documents to analyze, in sorted order.
fn collect_documents(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if DocumentFormat::from_filename(&name).is_ok() {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        bail!("no supported documents found under {}", path.display());
    }
    Ok(files)
}

fn render<T: Serialize>(value: &T, compact: bool) -> Result<String> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collects_supported_documents_recursively() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("nested")).expect("nested dir");
        fs::write(dir.path().join("b.txt"), "Budget: $500,000").expect("write");
        fs::write(dir.path().join("nested").join("a.PDF"), "%PDF").expect("write");
        fs::write(dir.path().join("notes.csv"), "a,b").expect("write");

        let files = collect_documents(dir.path()).expect("documents");
        let names: Vec<String> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.txt", "a.PDF"]);
    }

    #[test]
    fn single_file_is_used_as_is() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("budget.csv");
        fs::write(&file, "a,b").expect("write");
        assert_eq!(collect_documents(&file).expect("file"), vec![file]);
    }

    #[test]
    fn directory_without_documents_is_an_error() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("notes.csv"), "a,b").expect("write");
        assert!(collect_documents(dir.path()).is_err());
        assert!(collect_documents(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn cli_accepts_repeated_questions() {
        let cli = Cli::parse_from([
            "analyze-file",
            "proposal.pdf",
            "-q",
            "What is the budget?",
            "--question",
            "Who benefits?",
        ]);
        assert_eq!(cli.questions, vec!["What is the budget?", "Who benefits?"]);
        assert!(!cli.compact);
    }
}
