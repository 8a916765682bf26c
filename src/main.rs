use std::boxed::Box;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use rua::config;
use rua::demo;
use rua::dmarc::{self, ReportRecord};
use toml;

#[derive(Parser)]
#[command(name = "rua", version, about = "Generate and validate DMARC aggregate reports")]
struct Cli {
	/// Log level (off, error, warn, info, debug, trace); RUST_LOG filters still apply
	#[arg(long, global = true, default_value = "info")]
	log_level: LevelFilter,

	#[command(subcommand)]
	command: Command
}

#[derive(Subcommand)]
enum Command {
	/// Generate a range of demo reports as configured in the config file
	Demo {
		#[arg(long, default_value = "config.toml")]
		config: PathBuf
	},
	/// Render a report record given as JSON into an XML report
	Render {
		record: PathBuf,
		#[arg(long, default_value = ".")]
		out_dir: PathBuf
	},
	/// Validate XML reports against the aggregate report schema
	Validate {
		#[arg(required = true)]
		files: Vec<PathBuf>
	},
	/// Print the sample report record as JSON
	Sample
}

fn main() {
	let cli = Cli::parse();
	env_logger::Builder::from_default_env()
		.filter_level(cli.log_level)
		.init();

	let result = match cli.command {
		Command::Demo { config } => run_demo(&config),
		Command::Render { record, out_dir } => run_render(&record, &out_dir),
		Command::Validate { files } => run_validate(&files),
		Command::Sample => run_sample(),
	};

	if let Err(e) = result {
		error!("{}", e);
		process::exit(1);
	}
}

fn run_demo(config_path: &Path) -> Result<(), Box<dyn Error>> {
	if !config_path.exists() {
		info!("Could not find config, creating default...");
		fs::write(config_path, toml::to_string(&config::DEFAULT)?)?;
	}

	let config_text = fs::read_to_string(config_path)?;
	let config: config::Config = toml::from_str(&config_text)?;

	let written = demo::run(&config)?;
	info!("Generated {} reports in {}", written, config.output_dir);
	Ok(())
}

fn run_render(record_path: &Path, out_dir: &Path) -> Result<(), Box<dyn Error>> {
	let record = ReportRecord::from_json(&fs::read_to_string(record_path)?)?;
	let rendered = dmarc::render(&record)?;
	dmarc::validate(rendered.document())?;

	let path = rendered.path_in(out_dir, "xml");
	fs::write(&path, rendered.document())?;
	println!("{}", path.display());
	Ok(())
}

fn run_validate(files: &[PathBuf]) -> Result<(), Box<dyn Error>> {
	let mut failed = 0;
	for file in files {
		let text = fs::read_to_string(file)?;
		match dmarc::validate(&text) {
			Ok(()) => info!("{}: valid", file.display()),
			Err(e) => {
				error!("{}: {}", file.display(), e);
				failed += 1;
			},
		}
	}

	if failed > 0 {
		simple_error::bail!("{} of {} reports failed validation", failed, files.len());
	}
	Ok(())
}

fn run_sample() -> Result<(), Box<dyn Error>> {
	println!("{}", serde_json::to_string_pretty(&demo::sample_report())?);
	Ok(())
}
