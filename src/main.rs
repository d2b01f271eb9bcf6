//! JTL CLI - expand JSON templates from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod cli;

use jtl::{format_template_error, ExpandOptions, Template, TemplateError};

#[derive(Parser)]
#[command(name = "jtl")]
#[command(about = "JSON Template Language - expand JSON documents containing {{ }} expressions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a template and print the result
    Expand {
        /// Template file (JSON, YAML or TOML; `-` reads JSON from stdin)
        template: String,

        /// Parameter file (JSON, YAML or TOML)
        #[arg(short, long)]
        params: Option<String>,

        /// Set a single parameter, e.g. `--set count=3`
        #[arg(long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,

        /// Render undefined interpolations as null instead of failing
        #[arg(long)]
        undefined_as_null: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Print JSON on a single line
        #[arg(long)]
        compact: bool,
    },

    /// Parse a template and report syntax errors
    Check {
        /// Template file
        template: String,
    },

    /// Print the parsed template tree as JSON
    Ast {
        /// Template file
        template: String,
    },

    /// Print the token stream of a template
    Tokens {
        /// Template file
        template: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        match err.downcast_ref::<TemplateError>() {
            Some(template_err) => eprint!("{}", format_template_error(template_err)),
            None => cli::error(&format!("{:#}", err)),
        }
        std::process::exit(1);
    }
}

/// `JTL_LOG` takes precedence; `--verbose` raises the default to debug
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("JTL_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Expand {
            template,
            params,
            set,
            undefined_as_null,
            format,
            compact,
        } => {
            let compiled = compile(&template)?;
            let base = params.as_deref().map(cli::load_document).transpose()?;
            let params = cli::build_params(base, &set)?;
            let options = ExpandOptions {
                convert_undefined_to_null: undefined_as_null,
            };

            let output = compiled.render_with(&params, &options)?;
            tracing::debug!("expanded {}", template);

            match format {
                OutputFormat::Json if compact => println!("{}", serde_json::to_string(&output)?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&output)?),
            }
        }

        Commands::Check { template } => {
            let compiled = compile(&template)?;
            cli::success(&format!(
                "{} is valid ({} tokens)",
                template,
                compiled.tokens().len()
            ));
        }

        Commands::Ast { template } => {
            let compiled = compile(&template)?;
            println!("{}", serde_json::to_string_pretty(compiled.ast())?);
        }

        Commands::Tokens { template } => {
            let document = cli::load_document(&template)?;
            for (index, token) in jtl::to_tokens(&document).iter().enumerate() {
                println!("{}", cli::format_token(index, token));
            }
        }
    }

    Ok(())
}

fn compile(path: &str) -> Result<Template> {
    let document = cli::load_document(path)?;
    Template::compile(document)
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Failed to compile template: {}", path))
}
