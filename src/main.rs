use clap::Parser;
use colored::*;
use eyre::{Context, Result, bail, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

use mailforge::classify::ClassifyContext;
use mailforge::credentials::Credentials;
use mailforge::imap;
use mailforge::llm::{AnthropicClient, AnthropicConfig, GenerationRequest, TextGenerator};
use mailforge::report::LogReporter;
use mailforge::runner::{JobOutcome, JobSpec, RepairLoop};
use mailforge::sandbox::{Sandbox, SandboxConfig};
use mailforge::template::FsTemplateStore;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailforge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("mailforge.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Key resolution order: --key-file, then ./key, then ANTHROPIC_API_KEY
fn load_api_key(key_file: Option<&PathBuf>) -> Result<String> {
    if let Some(path) = key_file {
        let key = fs::read_to_string(path)
            .context(format!("Failed to read key file {}", path.display()))?;
        return Ok(key.trim().to_string());
    }

    let local_key = PathBuf::from("key");
    if local_key.exists() {
        let key = fs::read_to_string(&local_key).context("Failed to read ./key")?;
        return Ok(key.trim().to_string());
    }

    std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| eyre!("No API key: pass --key-file, create ./key, or set ANTHROPIC_API_KEY"))
}

fn build_client(cli: &Cli, config: &Config) -> Result<AnthropicClient> {
    let api_key = load_api_key(cli.key_file.as_ref())?;
    let llm_config = AnthropicConfig {
        model: config.llm.model.clone(),
        max_tokens: config.llm.max_tokens,
        timeout: Duration::from_millis(config.llm.timeout_ms),
        retries: config.llm.retries,
        ..Default::default()
    };
    AnthropicClient::with_api_key(api_key, llm_config).map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            username,
            password,
            domain,
            imap_server,
            imap_port,
            prompt,
            max_attempts,
            auto_query_imap,
        } => {
            handle_run_command(
                &cli,
                &config,
                username,
                password,
                domain.as_deref(),
                imap_server.as_deref(),
                *imap_port,
                prompt.as_deref(),
                *max_attempts,
                *auto_query_imap,
            )
            .await
        }
        Commands::Ask {
            prompt,
            system,
            model,
            max_tokens,
        } => {
            handle_ask_command(
                &cli,
                &config,
                prompt,
                system.as_deref(),
                model.as_deref(),
                *max_tokens,
            )
            .await
        }
        Commands::Templates => handle_templates_command(&config),
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_run_command(
    cli: &Cli,
    config: &Config,
    username: &str,
    password: &str,
    domain: Option<&str>,
    imap_server: Option<&str>,
    imap_port: Option<u16>,
    base_prompt: Option<&str>,
    max_attempts: Option<u32>,
    auto_query_imap: bool,
) -> Result<()> {
    let domain = match domain {
        Some(d) => d.to_lowercase(),
        None => imap::domain_of(username)?,
    };
    info!("Starting download job for domain {}", domain);

    let client = Arc::new(build_client(cli, config)?);

    let (imap_server, imap_port) = match imap_server {
        Some(server) => (
            Some(server.to_string()),
            Some(imap_port.unwrap_or(imap::DEFAULT_IMAP_PORT)),
        ),
        None if auto_query_imap => {
            println!("{} querying IMAP endpoint for {}", "Discovery:".cyan(), domain);
            let (server, port) = imap::discover_imap(client.as_ref(), &domain).await;
            println!("{} {}:{}", "Discovery:".cyan(), server, port);
            (Some(server), Some(port))
        }
        None => (None, None),
    };

    let work_dir = PathBuf::from(&config.execution.work_dir);
    let sandbox = Sandbox::new(SandboxConfig {
        work_dir: work_dir.clone(),
        interpreter: config.execution.interpreter.clone(),
        script_ext: "py".to_string(),
        timeout: Duration::from_secs(config.execution.timeout_secs),
    });
    let classify_ctx = ClassifyContext {
        artifact_root: work_dir.join("email"),
        work_dir,
    };
    let store = Arc::new(FsTemplateStore::new(&config.templates.dir));

    let mut spec = JobSpec::new(Credentials::new(username, password), &domain)
        .with_max_attempts(max_attempts.unwrap_or(config.jobs.max_attempts));
    if let Some(prompt) = base_prompt {
        spec = spec.with_base_prompt(prompt);
    }
    if let (Some(server), Some(port)) = (imap_server, imap_port) {
        spec = spec.with_imap(server, port);
    }

    let runner = RepairLoop::new(
        client,
        store,
        Arc::new(LogReporter),
        sandbox,
        classify_ctx,
        &config.jobs.runs_dir,
    );

    println!(
        "{} job {} for {} (budget {})",
        "Running:".green(),
        spec.job_id,
        username,
        spec.max_attempts
    );

    match runner.run(&spec).await? {
        JobOutcome::Complete {
            attempts,
            from_cache,
            template_path,
        } => {
            if from_cache {
                println!("{} cached template verified", "Success:".green());
            } else {
                println!(
                    "{} verified after {} attempt(s)",
                    "Success:".green(),
                    attempts
                );
            }
            if let Some(path) = template_path {
                println!("{} {}", "Template:".green(), path.display());
            }
            Ok(())
        }
        JobOutcome::Failed { attempts, evidence } => {
            println!(
                "{} no verified script after {} attempt(s)",
                "Failed:".red(),
                attempts
            );
            for line in &evidence {
                println!("  {}", line);
            }
            bail!("download job failed for {}", username)
        }
        JobOutcome::ApiError { attempts, detail } => {
            println!("{} {}", "API error:".red(), detail);
            bail!("generation failed on attempt {}", attempts)
        }
    }
}

async fn handle_ask_command(
    cli: &Cli,
    config: &Config,
    prompt: &str,
    system: Option<&str>,
    model: Option<&str>,
    max_tokens: Option<u32>,
) -> Result<()> {
    let client = build_client(cli, config)?;

    let mut request = GenerationRequest::new(prompt);
    if let Some(system) = system {
        request = request.with_system(system);
    }
    if let Some(model) = model {
        request = request.with_model(model);
    }
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }

    let response = client.generate(request).await?;
    println!("{}", response.text);
    info!(
        "ask used {} input / {} output tokens",
        response.usage.input_tokens, response.usage.output_tokens
    );
    Ok(())
}

fn handle_templates_command(config: &Config) -> Result<()> {
    let store = FsTemplateStore::new(&config.templates.dir);
    let templates = store.list()?;

    if templates.is_empty() {
        println!("{}", "No cached templates".yellow());
        return Ok(());
    }

    for template in templates {
        let path = template
            .path
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "{:<24} {} {}",
            template.domain_key.green(),
            template.created_at.format("%Y-%m-%d %H:%M:%S"),
            path
        );
    }
    Ok(())
}
