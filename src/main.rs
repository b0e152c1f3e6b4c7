use anyhow::Result;
use clap::{Parser, Subcommand};
use course_rag::commands::{ask, chat, ingest, list_courses};
use course_rag::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "course-rag")]
#[command(about = "Question answering over course materials with a local Ollama model")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index course documents from a folder of .txt files or a single file
    Ingest {
        /// Folder or file to ingest
        #[arg(default_value = "docs")]
        path: PathBuf,
        /// Re-index courses whose title is already present
        #[arg(long)]
        replace: bool,
        /// Drop both indexes before ingesting
        #[arg(long)]
        clear: bool,
    },
    /// Ask a single question
    Ask {
        query: String,
        /// Session id to attach the exchange to
        #[arg(long)]
        session: Option<String>,
        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start an interactive conversation
    Chat,
    /// List indexed courses
    Courses,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load_default()?)?;
            } else {
                run_interactive_config(&get_config_dir()?)?;
            }
        }
        Commands::Ingest {
            path,
            replace,
            clear,
        } => {
            ingest(&path, replace, clear).await?;
        }
        Commands::Ask {
            query,
            session,
            json,
        } => {
            ask(query, session, json).await?;
        }
        Commands::Chat => {
            chat().await?;
        }
        Commands::Courses => {
            list_courses().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["course-rag", "courses"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Courses));
        }
    }

    #[test]
    fn ingest_defaults_to_docs_folder() {
        let cli = Cli::try_parse_from(["course-rag", "ingest"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                path,
                replace,
                clear,
            } = parsed.command
            {
                assert_eq!(path, PathBuf::from("docs"));
                assert!(!replace);
                assert!(!clear);
            }
        }
    }

    #[test]
    fn ingest_with_flags() {
        let cli = Cli::try_parse_from([
            "course-rag",
            "ingest",
            "materials",
            "--replace",
            "--clear",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest {
                path,
                replace,
                clear,
            } = parsed.command
            {
                assert_eq!(path, PathBuf::from("materials"));
                assert!(replace);
                assert!(clear);
            }
        }
    }

    #[test]
    fn ask_with_session_and_json() {
        let cli = Cli::try_parse_from([
            "course-rag",
            "ask",
            "What is lesson 2 about?",
            "--session",
            "abc",
            "--json",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask {
                query,
                session,
                json,
            } = parsed.command
            {
                assert_eq!(query, "What is lesson 2 about?");
                assert_eq!(session.as_deref(), Some("abc"));
                assert!(json);
            }
        }
    }

    #[test]
    fn ask_requires_a_query() {
        let cli = Cli::try_parse_from(["course-rag", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["course-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["course-rag", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["course-rag", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
