//! gem-queue - Manage Gems and their schedules
//!
//! Unix-style tool for creating personas, scheduling jobs against them and
//! previewing what a Gem would post.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use libgemcast::config::resolve_db_path;
use libgemcast::error::PlatformError;
use libgemcast::generation::enhance::enhance_persona;
use libgemcast::generation::gemini::GeminiBackend;
use libgemcast::generation::create_pipeline;
use libgemcast::logging::{LogFormat, LoggingConfig};
use libgemcast::poster::{any_success, create_dispatcher, PublicationResults};
use libgemcast::scheduling::{normalize_daily_times, parse_interval_minutes, parse_timezone};
use libgemcast::types::DEFAULT_TIMEZONE;
use libgemcast::{
    Config, Database, Gem, GemFile, GemStore, GemcastError, GeneratedArtifact, JobStore,
    JobUpdate, PublicationResult, Recurrence, Result, ScheduledJob,
};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "gem-queue")]
#[command(version)]
#[command(about = "Manage Gems and their schedules")]
#[command(long_about = "\
gem-queue - Manage Gems and their schedules

DESCRIPTION:
    gem-queue is a Unix-style tool for managing the Gemcast store. A Gem is a
    persona (name, system instructions and reference files); a job tells
    gem-send when to generate and publish content for a Gem.

COMMANDS:
    gems list                   List Gems
    gems add <NAME>             Create a Gem
    gems edit <GEM_ID>          Change a Gem's name, instructions or files
    gems remove <GEM_ID>        Delete a Gem and its jobs
    gems enhance <GEM_ID>       Ask Gemini to improve a Gem's persona
    jobs list                   List scheduled jobs
    jobs add <GEM_ID>           Schedule a Gem
    jobs edit <JOB_ID>          Change a job's schedule or Gem
    jobs pause|resume <JOB_ID>  Toggle a job
    jobs remove <JOB_ID>        Delete a job
    generate <GEM_ID>           Generate content now (optionally publish it)

USAGE EXAMPLES:
    # Create a Gem with a reference photo
    gem-queue gems add \"Chef Luna\" --instructions \"You are a warm chef.\" \\
        --file /uploads/luna.png

    # Post every 90 minutes
    gem-queue jobs add <GEM_ID> --every 90m

    # Post at 08:00 and 18:30 Berlin time
    gem-queue jobs add <GEM_ID> --at 08:00 --at 18:30 --timezone Europe/Berlin

    # Move a job to evenings only
    gem-queue jobs edit <JOB_ID> --at 19:00 --timezone Europe/Berlin

    # Preview a caption without publishing
    gem-queue generate <GEM_ID> --no-image

    # Generate and publish to Facebook
    gem-queue generate <GEM_ID> --post --platform facebook

CONFIGURATION:
    Configuration file: ~/.config/gemcast/config.toml
    Database location: ~/.local/share/gemcast/gemcast.db

    Override with environment variables:
        GEMCAST_CONFIG    - Path to config file
        GEMCAST_DB_PATH   - Path to database file
        GEMINI_API_KEY    - Gemini API key (generate, enhance)

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Authentication failure or provider quota exhausted
    3 - Invalid input (bad ID, time, timezone or interval)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text")]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    #[arg(help = "Enable verbose logging to stderr (useful for debugging)")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage Gems
    Gems {
        #[command(subcommand)]
        action: GemCommands,
    },

    /// Manage scheduled jobs
    Jobs {
        #[command(subcommand)]
        action: JobCommands,
    },

    /// Generate content for a Gem now
    Generate {
        /// Gem ID
        gem_id: String,

        /// Skip the image stages
        #[arg(long)]
        no_image: bool,

        /// Publish the result
        #[arg(long)]
        post: bool,

        /// Target platform (repeatable; defaults from config)
        #[arg(short, long = "platform", requires = "post")]
        platforms: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum GemCommands {
    /// List Gems
    List,

    /// Create a Gem
    Add {
        /// Display name
        name: String,

        /// System instructions for the persona
        #[arg(short, long)]
        instructions: String,

        /// Reference file URI (repeatable), e.g. /uploads/face.png
        #[arg(long = "file", value_name = "URI")]
        files: Vec<String>,
    },

    /// Change a Gem's name, instructions or reference files
    Edit {
        /// Gem ID
        gem_id: String,

        /// New display name
        #[arg(long)]
        name: Option<String>,

        /// New system instructions
        #[arg(short, long)]
        instructions: Option<String>,

        /// Replace the reference files (repeatable)
        #[arg(long = "file", value_name = "URI", conflicts_with = "clear_files")]
        files: Vec<String>,

        /// Remove every reference file
        #[arg(long)]
        clear_files: bool,
    },

    /// Delete a Gem together with every job that references it
    ///
    /// Jobs are only removed by this explicit command; gem-send never
    /// deletes a job, even when its Gem is missing.
    Remove {
        /// Gem ID
        gem_id: String,
    },

    /// Rewrite a Gem's persona with Gemini
    Enhance {
        /// Gem ID
        gem_id: String,

        /// Save the enhanced persona instead of only printing it
        #[arg(long)]
        apply: bool,
    },
}

#[derive(Subcommand, Debug)]
enum JobCommands {
    /// List scheduled jobs
    List,

    /// Schedule a Gem
    Add {
        /// Gem ID
        gem_id: String,

        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Change a job's schedule or the Gem it runs
    Edit {
        /// Job ID
        job_id: String,

        #[command(flatten)]
        schedule: ScheduleArgs,

        /// Run a different Gem
        #[arg(long, value_name = "GEM_ID")]
        gem: Option<String>,
    },

    /// Stop a job from firing
    Pause {
        /// Job ID
        job_id: String,
    },

    /// Let a paused job fire again
    Resume {
        /// Job ID
        job_id: String,
    },

    /// Delete a job
    Remove {
        /// Job ID
        job_id: String,
    },
}

#[derive(Args, Debug)]
struct ScheduleArgs {
    /// Fire every DURATION (e.g. "90m", "2h", "1h 30m")
    #[arg(long, value_name = "DURATION", conflicts_with_all = ["at", "timezone"])]
    every: Option<String>,

    /// Fire daily at HH:MM (repeatable)
    #[arg(long, value_name = "HH:MM")]
    at: Vec<String>,

    /// IANA timezone for --at times
    #[arg(long, requires = "at")]
    timezone: Option<String>,
}

impl ScheduleArgs {
    /// The validated recurrence, or `None` when no schedule flag was given
    fn recurrence(&self) -> Result<Option<Recurrence>> {
        if let Some(every) = &self.every {
            return Ok(Some(Recurrence::interval(parse_interval_minutes(every)?)));
        }
        if self.at.is_empty() {
            return Ok(None);
        }

        let timezone = self.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE);
        parse_timezone(timezone)?;
        Ok(Some(Recurrence::daily(normalize_daily_times(&self.at)?, timezone)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(GemcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Quiet unless asked; errors still reach stderr
    LoggingConfig::new(LogFormat::Text, "error".to_string(), cli.verbose).init();

    // Run the main logic and handle errors
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let format = parse_format(&cli.format)?;

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::new(&resolve_db_path(&config.database.path)).await?;

    match cli.command {
        Commands::Gems { action } => match action {
            GemCommands::List => cmd_gems_list(&db, format).await?,
            GemCommands::Add {
                name,
                instructions,
                files,
            } => cmd_gems_add(&db, format, name, instructions, &files).await?,
            GemCommands::Edit {
                gem_id,
                name,
                instructions,
                files,
                clear_files,
            } => {
                let files = (clear_files || !files.is_empty()).then_some(files);
                cmd_gems_edit(&db, format, &gem_id, name, instructions, files).await?
            }
            GemCommands::Remove { gem_id } => cmd_gems_remove(&db, &gem_id).await?,
            GemCommands::Enhance { gem_id, apply } => {
                cmd_gems_enhance(&db, &config, format, &gem_id, apply).await?
            }
        },
        Commands::Jobs { action } => match action {
            JobCommands::List => cmd_jobs_list(&db, format).await?,
            JobCommands::Add { gem_id, schedule } => {
                cmd_jobs_add(&db, format, &gem_id, &schedule).await?
            }
            JobCommands::Edit {
                job_id,
                schedule,
                gem,
            } => cmd_jobs_edit(&db, format, &job_id, &schedule, gem).await?,
            JobCommands::Pause { job_id } => cmd_jobs_set_active(&db, &job_id, false).await?,
            JobCommands::Resume { job_id } => cmd_jobs_set_active(&db, &job_id, true).await?,
            JobCommands::Remove { job_id } => cmd_jobs_remove(&db, &job_id).await?,
        },
        Commands::Generate {
            gem_id,
            no_image,
            post,
            platforms,
        } => cmd_generate(&db, &config, format, &gem_id, !no_image, post, platforms).await?,
    }

    db.close().await;
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GemcastError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", json);
    Ok(())
}

async fn require_gem(db: &Database, gem_id: &str) -> Result<Gem> {
    db.get_gem(gem_id)
        .await?
        .ok_or_else(|| GemcastError::Lookup(format!("Gem not found: {}", gem_id)))
}

// GEMS

async fn cmd_gems_list(db: &Database, format: OutputFormat) -> Result<()> {
    let gems = db.list_gems().await?;

    match format {
        OutputFormat::Json => print_json(&gems)?,
        OutputFormat::Text => {
            for gem in &gems {
                println!(
                    "{} | {} | {} | {}",
                    gem.id,
                    gem.name,
                    plural(gem.files.len(), "file"),
                    truncate_content(&gem.instructions, 50)
                );
            }
        }
    }
    Ok(())
}

async fn cmd_gems_add(
    db: &Database,
    format: OutputFormat,
    name: String,
    instructions: String,
    files: &[String],
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GemcastError::InvalidInput("Gem name cannot be empty".to_string()));
    }
    if instructions.trim().is_empty() {
        return Err(GemcastError::InvalidInput(
            "Gem instructions cannot be empty".to_string(),
        ));
    }

    let files = files.iter().map(|uri| gem_file(uri)).collect();
    let gem = Gem::new(name.trim().to_string(), instructions, files);
    db.create_gem(&gem).await?;
    debug!("Created Gem {}", gem.id);

    match format {
        OutputFormat::Json => print_json(&gem)?,
        OutputFormat::Text => println!("{}", gem.id),
    }
    Ok(())
}

async fn cmd_gems_edit(
    db: &Database,
    format: OutputFormat,
    gem_id: &str,
    name: Option<String>,
    instructions: Option<String>,
    files: Option<Vec<String>>,
) -> Result<()> {
    if name.is_none() && instructions.is_none() && files.is_none() {
        return Err(GemcastError::InvalidInput(
            "Nothing to change: pass --name, --instructions, --file or --clear-files".to_string(),
        ));
    }

    let mut gem = require_gem(db, gem_id).await?;

    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(GemcastError::InvalidInput("Gem name cannot be empty".to_string()));
        }
        gem.name = name.trim().to_string();
    }
    if let Some(instructions) = instructions {
        if instructions.trim().is_empty() {
            return Err(GemcastError::InvalidInput(
                "Gem instructions cannot be empty".to_string(),
            ));
        }
        gem.instructions = instructions;
    }
    if let Some(files) = files {
        gem.files = files.iter().map(|uri| gem_file(uri)).collect();
    }

    db.update_gem(&gem).await?;
    debug!("Updated Gem {}", gem.id);

    if format == OutputFormat::Json {
        print_json(&gem)?;
    }
    Ok(())
}

async fn cmd_gems_remove(db: &Database, gem_id: &str) -> Result<()> {
    let orphaned: Vec<ScheduledJob> = db
        .list_jobs()
        .await?
        .into_iter()
        .filter(|job| job.gem_id == gem_id)
        .collect();

    if !db.delete_gem(gem_id).await? {
        return Err(GemcastError::Lookup(format!("Gem not found: {}", gem_id)));
    }

    for job in &orphaned {
        db.delete_job(&job.id).await?;
    }
    if !orphaned.is_empty() {
        eprintln!("Removed {}", plural(orphaned.len(), "job"));
    }
    Ok(())
}

async fn cmd_gems_enhance(
    db: &Database,
    config: &Config,
    format: OutputFormat,
    gem_id: &str,
    apply: bool,
) -> Result<()> {
    let mut gem = require_gem(db, gem_id).await?;

    let backend = GeminiBackend::new(&config.gemini.prompt_model, config.gemini.resolve_api_key()?)
        .with_base_url(&config.gemini.base_url);
    let enhanced = enhance_persona(&backend, &gem.name, &gem.instructions).await?;

    if apply {
        gem.name = enhanced.name.clone();
        gem.instructions = enhanced.instructions.clone();
        db.update_gem(&gem).await?;
        debug!("Saved enhanced persona for Gem {}", gem.id);
    }

    match format {
        OutputFormat::Json => print_json(&enhanced)?,
        OutputFormat::Text => {
            println!("{}", enhanced.name);
            println!();
            println!("{}", enhanced.instructions);
        }
    }
    Ok(())
}

/// Build a `GemFile` from a URI, naming it after the last path segment
fn gem_file(uri: &str) -> GemFile {
    let name = uri.rsplit('/').next().unwrap_or(uri).to_string();
    GemFile {
        uri: uri.to_string(),
        name,
        mime_type: guess_mime(uri).to_string(),
    }
}

fn guess_mime(uri: &str) -> &'static str {
    let extension = uri
        .rsplit('.')
        .next()
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

// JOBS

async fn cmd_jobs_list(db: &Database, format: OutputFormat) -> Result<()> {
    let jobs = db.list_jobs().await?;

    match format {
        OutputFormat::Json => print_json(&jobs)?,
        OutputFormat::Text => {
            for job in &jobs {
                println!(
                    "{} | gem {} | {} | {} | {}",
                    job.id,
                    job.gem_id,
                    describe_recurrence(&job.recurrence),
                    if job.active { "active" } else { "paused" },
                    job.last_run
                        .map(format_last_run)
                        .unwrap_or_else(|| "never run".to_string())
                );
            }
        }
    }
    Ok(())
}

async fn cmd_jobs_add(
    db: &Database,
    format: OutputFormat,
    gem_id: &str,
    schedule: &ScheduleArgs,
) -> Result<()> {
    let recurrence = schedule.recurrence()?.ok_or_else(|| {
        GemcastError::InvalidInput("Specify either --every <DURATION> or --at <HH:MM>".to_string())
    })?;

    require_gem(db, gem_id).await?;

    let job = ScheduledJob::new(gem_id.to_string(), recurrence);
    db.create_job(&job).await?;
    debug!("Scheduled job {} for Gem {}", job.id, gem_id);

    match format {
        OutputFormat::Json => print_json(&job)?,
        OutputFormat::Text => println!("{}", job.id),
    }
    Ok(())
}

async fn cmd_jobs_edit(
    db: &Database,
    format: OutputFormat,
    job_id: &str,
    schedule: &ScheduleArgs,
    gem_id: Option<String>,
) -> Result<()> {
    let update = JobUpdate {
        recurrence: schedule.recurrence()?,
        gem_id,
        ..Default::default()
    };
    if update.recurrence.is_none() && update.gem_id.is_none() {
        return Err(GemcastError::InvalidInput(
            "Nothing to change: pass --every, --at or --gem".to_string(),
        ));
    }

    if let Some(gem_id) = &update.gem_id {
        require_gem(db, gem_id).await?;
    }

    if !db.update_job(job_id, &update).await? {
        return Err(GemcastError::Lookup(format!("Job not found: {}", job_id)));
    }
    debug!("Updated job {}", job_id);

    if format == OutputFormat::Json {
        let job = db
            .get_job(job_id)
            .await?
            .ok_or_else(|| GemcastError::Lookup(format!("Job not found: {}", job_id)))?;
        print_json(&job)?;
    }
    Ok(())
}

async fn cmd_jobs_set_active(db: &Database, job_id: &str, active: bool) -> Result<()> {
    if !db.update_job(job_id, &JobUpdate::active(active)).await? {
        return Err(GemcastError::Lookup(format!("Job not found: {}", job_id)));
    }
    Ok(())
}

async fn cmd_jobs_remove(db: &Database, job_id: &str) -> Result<()> {
    if !db.delete_job(job_id).await? {
        return Err(GemcastError::Lookup(format!("Job not found: {}", job_id)));
    }
    Ok(())
}

fn describe_recurrence(recurrence: &Recurrence) -> String {
    match recurrence {
        Recurrence::Interval { minutes } => match minutes {
            Some(minutes) => format!("every {}m", minutes),
            None => "every ?m".to_string(),
        },
        Recurrence::Daily { times, timezone } => format!(
            "daily {} ({})",
            times.join(", "),
            timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
        ),
        Recurrence::Unknown(kind) => format!("unknown type '{}'", kind),
    }
}

fn format_last_run(at_ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(at_ms) {
        Some(at) => format!("last run {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => format!("last run {}ms", at_ms),
    }
}

// GENERATE

async fn cmd_generate(
    db: &Database,
    config: &Config,
    format: OutputFormat,
    gem_id: &str,
    want_image: bool,
    post: bool,
    platforms: Vec<String>,
) -> Result<()> {
    let gem = require_gem(db, gem_id).await?;
    let pipeline = create_pipeline(config)?;

    let artifact = pipeline.generate_for(&gem, want_image).await?;

    let results = if post {
        let platforms = if platforms.is_empty() {
            config.default_platforms()
        } else {
            platforms
        };
        let dispatcher = create_dispatcher(config);
        Some(dispatcher.publish(&artifact, &platforms).await)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "artifact": artifact,
            "results": results,
        }))?,
        OutputFormat::Text => output_generate_text(&artifact, results.as_ref()),
    }

    match results {
        Some(results) if !any_success(&results) => Err(PlatformError::Posting(
            "no platform accepted the post".to_string(),
        )
        .into()),
        _ => Ok(()),
    }
}

fn output_generate_text(artifact: &GeneratedArtifact, results: Option<&PublicationResults>) {
    println!("{}", artifact.caption);
    if let Some(prompt) = &artifact.image_prompt {
        println!();
        println!("Image prompt: {}", prompt);
    }
    if let Some(url) = &artifact.image_url {
        println!("Image: {}", url);
    }

    if let Some(results) = results {
        println!();
        for (platform, result) in results {
            match result {
                PublicationResult::Published { post_id } => {
                    println!("{}: {}", platform, post_id)
                }
                PublicationResult::Failed { error } => println!("{}: failed ({})", platform, error),
            }
        }
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    let single_line = content.replace('\n', " ");
    if single_line.chars().count() <= max_len {
        single_line
    } else {
        let cut: String = single_line.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}

fn plural(count: usize, noun: &str) -> String {
    format!("{} {}{}", count, noun, if count == 1 { "" } else { "s" })
}
