use std::{
	io::Read as _,
	path::{Path, PathBuf},
	sync::Arc,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, eyre};
use jira_sync::{
	AppConfig, Orchestrator,
	document::FsDocumentHost,
	expr::{self, Direction},
	logging, markdown_to_wiki, marker, tracker, wiki_to_markdown,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
	/// Config file to use instead of `$XDG_CONFIG_HOME/jira_sync/config.toml`
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Convert tracker wiki markup to markdown. Reads stdin when no file is given.
	WikiToMd(TextArgs),
	/// Convert markdown to tracker wiki markup. Reads stdin when no file is given.
	MdToWiki(TextArgs),
	/// Print the sync markers of a document as JSON
	Markers(TextArgs),
	/// Fetch the document's issue and write it into the document
	Pull { doc: String },
	/// Send the document's fields to the tracker, creating the issue if it has no key yet
	Push { doc: String },
	/// List the available transitions, or apply one with `--id`
	Transition(TransitionArgs),
	/// Post the work logs listed under `jira_worklog_batch` in the document's frontmatter
	Worklog { doc: String },
	/// Pull an issue into its document, creating the document if needed
	Import { key: String },
	/// Import every issue matching a query
	ImportQuery {
		query: String,
		/// At most this many issues
		#[arg(short, long)]
		limit: Option<usize>,
	},
	/// Compile a field mapping expression and report whether it would be accepted
	CheckMapping(CheckMappingArgs),
}

#[derive(Args)]
struct TextArgs {
	file: Option<PathBuf>,
}

#[derive(Args)]
struct TransitionArgs {
	doc: String,
	/// Transition to apply
	#[arg(long)]
	id: Option<String>,
	/// Status the transition leads to, written into the document. Looked up from the transition when omitted.
	#[arg(long)]
	status: Option<String>,
}

#[derive(Args)]
struct CheckMappingArgs {
	expression: String,
	#[arg(short, long, value_enum, default_value_t = CliDirection::ToRemote)]
	direction: CliDirection,
	/// Only check syntax and identifiers, without running the expression once
	#[arg(long)]
	no_smoke_test: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliDirection {
	ToRemote,
	FromRemote,
}

impl From<CliDirection> for Direction {
	fn from(direction: CliDirection) -> Self {
		match direction {
			CliDirection::ToRemote => Direction::ToRemote,
			CliDirection::FromRemote => Direction::FromRemote,
		}
	}
}

fn read_input(file: Option<&Path>) -> Result<String> {
	match file {
		Some(path) => std::fs::read_to_string(path).wrap_err_with(|| format!("failed to read {}", path.display())),
		None => {
			let mut text = String::new();
			std::io::stdin().read_to_string(&mut text).wrap_err("failed to read stdin")?;
			Ok(text)
		}
	}
}

fn connect(config_path: Option<&Path>) -> Result<Orchestrator> {
	let config = AppConfig::load(config_path)?;
	let client = tracker::create_client(&config)?;
	let host = Arc::new(FsDocumentHost::new(config.vault_root.clone()));
	Ok(Orchestrator::new(client, host, &config))
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	logging::init_subscriber();
	tracing::debug!(version = env!("CARGO_PKG_VERSION"), git_hash = ?option_env!("GIT_HASH"), "starting");
	let cli = Cli::parse();
	let config_path = cli.config.as_deref();

	match cli.command {
		Commands::WikiToMd(args) => print!("{}", wiki_to_markdown(&read_input(args.file.as_deref())?)),
		Commands::MdToWiki(args) => print!("{}", markdown_to_wiki(&read_input(args.file.as_deref())?)),
		Commands::Markers(args) => {
			let markers = marker::parse_markers(&read_input(args.file.as_deref())?);
			println!("{}", serde_json::to_string_pretty(&markers)?);
		}
		Commands::CheckMapping(args) => {
			if let Err(e) = expr::validate(&args.expression, args.direction.into(), !args.no_smoke_test) {
				eprintln!("{:?}", miette::Report::new(e.clone()));
				return Err(e.into());
			}
			println!("ok");
		}
		Commands::Pull { doc } => {
			let issue = connect(config_path)?.fetch_and_pull(&doc).await?;
			println!("pulled {} into {doc}", issue.key);
		}
		Commands::Push { doc } => {
			let key = connect(config_path)?.push_to_remote(&doc).await?;
			println!("pushed {doc} to {key}");
		}
		Commands::Transition(args) => {
			let orchestrator = connect(config_path)?;
			let transitions = orchestrator.transitions(&args.doc).await?;
			let Some(id) = args.id else {
				println!("{}", serde_json::to_string_pretty(&transitions)?);
				return Ok(());
			};
			let status = match args.status {
				Some(status) => status,
				None => transitions
					.iter()
					.find(|t| t.id == id)
					.map(|t| t.status.clone())
					.ok_or_else(|| eyre!("transition {id} is not available for {}", args.doc))?,
			};
			orchestrator.transition_status(&args.doc, &id, &status).await?;
			println!("{} is now {status}", args.doc);
		}
		Commands::Worklog { doc } => {
			let report = connect(config_path)?.post_work_log_batch_from(&doc).await?;
			println!("{report}");
		}
		Commands::Import { key } => {
			let path = connect(config_path)?.import_by_key(&key).await?;
			println!("imported {key} into {path}");
		}
		Commands::ImportQuery { query, limit } => {
			let report = connect(config_path)?.import_by_query(&query, limit).await?;
			println!("{report}");
		}
	}

	Ok(())
}
