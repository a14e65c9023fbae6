use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
};

use serde::Serialize;
use thiserror::Error;

use truescan::{
    error::ConfigError,
    load_config,
    transport::FilePart,
    ApiError, AppServices, ServiceError,
};

const USAGE: &str = "usage:
  truescan analyze [--conversation TEXT] FILE...
  truescan place [--conversation TEXT] FILE
  truescan search IMAGE
  truescan me";

#[derive(Debug, PartialEq)]
enum Command {
    Analyze {
        files: Vec<PathBuf>,
        conversation: Option<String>,
    },
    Place {
        file: PathBuf,
        conversation: Option<String>,
    },
    Search {
        image: PathBuf,
    },
    Me,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("encode output: {0}")]
    Output(#[from] serde_json::Error),
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, CliError> {
    let name = args
        .next()
        .ok_or_else(|| CliError::Usage("missing command".to_string()))?;

    let mut conversation = None;
    let mut positional = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--conversation" => {
                conversation = Some(flag_value(&mut args, "--conversation")?);
            }
            flag if flag.starts_with("--") => {
                return Err(CliError::Usage(format!("unknown flag {flag}")));
            }
            _ => positional.push(PathBuf::from(&arg)),
        }
    }

    let single = |mut positional: Vec<PathBuf>, what: &str| match positional.len() {
        1 => Ok(positional.remove(0)),
        _ => Err(CliError::Usage(format!("{name} takes exactly one {what}"))),
    };

    match name.as_str() {
        "analyze" => {
            if positional.is_empty() && conversation.is_none() {
                return Err(CliError::Usage(
                    "analyze needs at least one FILE or --conversation".to_string(),
                ));
            }
            Ok(Command::Analyze {
                files: positional,
                conversation,
            })
        }
        "place" => Ok(Command::Place {
            file: single(positional, "FILE")?,
            conversation,
        }),
        "search" => Ok(Command::Search {
            image: single(positional, "IMAGE")?,
        }),
        "me" => Ok(Command::Me),
        other => Err(CliError::Usage(format!("unknown command {other}"))),
    }
}

fn flag_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, CliError> {
    args.next()
        .ok_or_else(|| CliError::Usage(format!("{flag} needs a value")))
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })
}

fn file_part(field: &str, path: &Path) -> Result<FilePart, CliError> {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string());
    Ok(FilePart::new(field, filename, read_file(path)?))
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(services: &AppServices, command: Command) -> Result<(), CliError> {
    match command {
        Command::Analyze {
            files,
            conversation,
        } => {
            let parts = files
                .iter()
                .map(|path| file_part("files", path))
                .collect::<Result<Vec<_>, _>>()?;
            let report = services
                .analysis
                .analyze(parts, conversation.as_deref())
                .await?;
            print_json(&report)
        }
        Command::Place { file, conversation } => {
            let part = file_part("file", &file)?;
            let place = services
                .analysis
                .identify_place(part, conversation.as_deref())
                .await?;
            print_json(&serde_json::json!({ "place": place }))
        }
        Command::Search { image } => {
            let hits = services.search.search_by_image(read_file(&image)?).await?;
            print_json(&hits)
        }
        Command::Me => {
            services
                .auth
                .ensure_authorized(&services.config.apphud_id)
                .await?;
            let user = services.auth.me().await?;
            print_json(&serde_json::json!({
                "id": user.id,
                "apphud_id": user.apphud_id,
                "tokens": user.tokens,
                "premium": services.premium.is_premium(),
            }))
        }
    }
}

async fn run() -> Result<(), CliError> {
    let command = parse_args(env::args().skip(1))?;
    let config = load_config()?;
    let services = AppServices::new(config)?;

    let interrupt = {
        let services = services.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("cancel requested");
                services.cancel_all();
            }
        })
    };
    let result = execute(&services, command).await;
    interrupt.abort();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let _guards = truescan_common::init_tracing("truescan");

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}\n\n{USAGE}");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!(error = %err, "truescan failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, CliError> {
        parse_args(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_analyze_with_flags() {
        let command = parse(&[
            "analyze",
            "--conversation",
            "send me money",
            "a.png",
            "b.pdf",
        ])
        .unwrap();
        assert_eq!(
            command,
            Command::Analyze {
                files: vec![PathBuf::from("a.png"), PathBuf::from("b.pdf")],
                conversation: Some("send me money".to_string()),
            }
        );
    }

    #[test]
    fn rejects_bad_invocations() {
        assert!(matches!(parse(&[]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["analyze"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["search"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["place", "a.jpg", "b.jpg"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["analyze", "--conversation"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["analyze", "--kind", "image", "a"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["me", "--verbose"]), Err(CliError::Usage(_))));
        assert!(matches!(parse(&["upload"]), Err(CliError::Usage(_))));
    }

    #[test]
    fn parses_single_target_commands() {
        assert_eq!(
            parse(&["search", "face.jpg"]).unwrap(),
            Command::Search {
                image: PathBuf::from("face.jpg")
            }
        );
        assert_eq!(parse(&["me"]).unwrap(), Command::Me);
    }
}
