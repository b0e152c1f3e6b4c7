use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::config::Config;
use crate::rag::{IngestOutcome, IngestionReport, QueryRequest, RagSystem};

async fn open_system() -> Result<RagSystem> {
    let config = Config::load_default()?;
    RagSystem::open(config)
        .await
        .context("Failed to open the course indexes")
}

/// Index course documents from a file or a folder of `.txt` files
#[inline]
pub async fn ingest(path: &Path, replace: bool, clear: bool) -> Result<()> {
    let system = open_system().await?;

    if clear {
        system.clear_indexes().await?;
        println!("Cleared existing course indexes.");
    }

    let files: Vec<PathBuf> = if path.is_dir() {
        RagSystem::course_files(path)
            .with_context(|| format!("Failed to list {}", path.display()))?
    } else if path.is_file() {
        vec![path.to_path_buf()]
    } else {
        bail!("No such file or directory: {}", path.display());
    };

    if files.is_empty() {
        println!("No course documents (*.txt) found in {}", path.display());
        return Ok(());
    }

    info!("Ingesting {} course documents", files.len());

    let bar = if console::user_attended_stderr() {
        ProgressBar::new(files.len() as u64).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };

    let report = system
        .add_course_files(&files, replace, |file, result| {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match result {
                Ok(IngestOutcome::Added { title, chunks }) => {
                    bar.println(format!("  {} {} ({} chunks)", style("+").green(), title, chunks));
                }
                Ok(IngestOutcome::Skipped { title }) => {
                    bar.println(format!("  {} {} (already indexed)", style("=").dim(), title));
                }
                Err(e) => {
                    error!("Failed to ingest {}: {}", file.display(), e);
                    bar.println(format!("  {} {}: {}", style("!").red(), name, e));
                }
            }
            bar.set_message(name);
            bar.inc(1);
        })
        .await;
    bar.finish_and_clear();

    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestionReport) {
    println!();
    println!("Ingestion complete:");
    println!("  Courses added: {}", report.courses_added);
    println!("  Chunks added: {}", report.chunks_added);
    if !report.skipped.is_empty() {
        println!("  Already indexed: {}", report.skipped.len());
    }
    if !report.failures.is_empty() {
        println!("  Failed: {}", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.path.display(), failure.error);
        }
    }
}

/// Answer one question and print the answer with its sources
#[inline]
pub async fn ask(query: String, session_id: Option<String>, json: bool) -> Result<()> {
    let system = open_system().await?;

    let response = system
        .handle_query(QueryRequest { query, session_id })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("{}", style("Sources:").bold());
        for source in &response.sources {
            println!("  - {}", source);
        }
    }
    Ok(())
}

/// Interactive question loop sharing one session
#[inline]
pub async fn chat() -> Result<()> {
    let system = open_system().await?;
    let session_id = system.sessions().create_session();

    eprintln!("{}", style("Course assistant").bold().cyan());
    eprintln!("Ask about your courses. Type 'exit' to quit, 'clear' to forget the conversation.");
    eprintln!();

    loop {
        let line: String = Input::new()
            .with_prompt("You")
            .allow_empty(true)
            .interact_text()?;
        let line = line.trim();

        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                system.sessions().clear(&session_id);
                eprintln!("{}", style("Conversation cleared.").dim());
                continue;
            }
            _ => {}
        }

        match system.query(line, Some(&session_id)).await {
            Ok((answer, sources)) => {
                println!();
                println!("{}", answer);
                if !sources.is_empty() {
                    println!("{}", style(format!("Sources: {}", sources.join(", "))).dim());
                }
                println!();
            }
            Err(e) => {
                error!("Query failed: {}", e);
                eprintln!("{} {}", style("Error:").red().bold(), e);
            }
        }
    }

    system.sessions().remove(&session_id);
    Ok(())
}

/// List catalogued courses with their lesson counts
#[inline]
pub async fn list_courses() -> Result<()> {
    let system = open_system().await?;
    let stats = system.course_stats().await?;

    if stats.course_count == 0 {
        println!("No courses have been indexed yet.");
        println!("Use 'course-rag ingest <folder>' to add course documents.");
        return Ok(());
    }

    println!("Courses ({} total):", stats.course_count);
    println!();

    for title in &stats.course_titles {
        println!("📚 {}", title);
        if let Some(course) = system.catalog().get_course(title).await? {
            println!("   Instructor: {}", course.instructor);
            println!("   Link: {}", course.course_link);
            println!("   Lessons: {}", course.lessons.len());
        }
        let chunks = system.content().course_chunk_count(title).await?;
        println!("   Content Chunks: {}", chunks);
        println!();
    }

    Ok(())
}
