//! One-shot CLI commands
//!
//! Each command fetches through a [`RequestHandle`] so it gets the same
//! caching, pacing and retry behavior as the dashboard, then prints either a
//! plain-text table or JSON.

use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cache::CacheManager;
use crate::cli::{CliError, Command, OutputArgs};
use crate::config::Settings;
use crate::data::{ApiClient, Category, CreditBalance, Job};
use crate::refresh::watch_job;
use crate::request::{RequestError, RequestExecutor, RequestHandle};

/// Cache key for the job list
pub const JOBS_KEY: &str = "jobs";
/// Cache key for the credit balance
pub const CREDITS_KEY: &str = "credits";
/// Cache key for the category list
pub const CATEGORIES_KEY: &str = "categories";

/// Shared pieces every command needs
#[derive(Debug, Clone)]
pub struct Context {
    pub api: ApiClient,
    pub cache: CacheManager,
    pub settings: Settings,
}

impl Context {
    /// Builds the API client described by `settings`
    pub fn new(settings: Settings) -> Result<Self, CliError> {
        let api = ApiClient::new(settings.api_url.clone(), settings.http_timeout())?
            .with_token(settings.token.clone());
        Ok(Self::with_api(api, settings))
    }

    /// Uses an already-built API client
    pub fn with_api(api: ApiClient, settings: Settings) -> Self {
        Self {
            api,
            cache: CacheManager::new(),
            settings,
        }
    }

    /// Creates a request handle sharing this context's cache
    pub fn handle<T>(&self, cache_key: Option<&str>) -> RequestHandle<T>
    where
        T: Clone + Serialize + DeserializeOwned,
    {
        RequestHandle::new(self.cache.clone(), self.settings.request_options(cache_key))
            .with_locale(self.settings.locale)
    }

    /// Creates an executor sharing this context's cache
    pub fn executor(&self, cache_key: Option<&str>) -> RequestExecutor {
        RequestExecutor::new(self.cache.clone(), self.settings.request_options(cache_key))
    }
}

/// Runs a non-dashboard command, writing its output to `out`
///
/// # Errors
/// [`CliError::Interactive`] for [`Command::Dashboard`], which `main` runs
/// as the terminal UI instead.
pub async fn run(command: Command, ctx: &Context, out: &mut impl Write) -> Result<(), CliError> {
    match command {
        Command::Dashboard => Err(CliError::Interactive),
        Command::Jobs(output) => {
            let jobs = fetch(ctx, Some(JOBS_KEY), || ctx.api.list_jobs()).await?;
            print_or_json(out, output, jobs.as_slice(), write_jobs)
        }
        Command::Job { id, output } => {
            let job = fetch(ctx, None, || ctx.api.get_job(&id)).await?;
            print_or_json(out, output, &job, write_job)
        }
        Command::Categories(output) => {
            let categories =
                fetch(ctx, Some(CATEGORIES_KEY), || ctx.api.list_categories()).await?;
            print_or_json(out, output, categories.as_slice(), write_categories)
        }
        Command::Credits(output) => {
            let balance = fetch(ctx, Some(CREDITS_KEY), || ctx.api.credit_balance()).await?;
            print_or_json(out, output, &balance, write_credits)
        }
        Command::Watch { id, interval } => {
            let handle = ctx.handle::<Job>(None);
            let job = watch_job(
                &handle,
                &ctx.api,
                &id,
                Duration::from_secs(interval),
                |job| {
                    // Progress lines are best-effort
                    let _ = writeln!(out, "{}  {}", job.id, job.status.label());
                },
            )
            .await
            .map_err(CliError::Request)?;
            if let Some(ref reason) = job.error {
                writeln!(out, "error: {}", reason)?;
            }
            Ok(())
        }
        Command::Download { id, out: dir } => {
            let job = fetch(ctx, None, || ctx.api.get_job(&id)).await?;
            let saved = download_images(ctx, &job, &dir).await?;
            for path in &saved {
                writeln!(out, "{}", path.display())?;
            }
            if saved.is_empty() {
                writeln!(out, "Job {} has no processed images yet", job.id)?;
            }
            Ok(())
        }
    }
}

/// Fetches through a fresh handle, mapping failure to the user-facing message
async fn fetch<T, F, Fut>(ctx: &Context, cache_key: Option<&str>, request_fn: F) -> Result<T, CliError>
where
    T: Clone + Serialize + DeserializeOwned,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let handle = ctx.handle::<T>(cache_key);
    match handle.request(request_fn).await {
        Some(data) => Ok(data),
        None => Err(CliError::Request(handle.state().error.unwrap_or_default())),
    }
}

/// Saves every processed image of `job` into `dir`, returning the paths
///
/// Images download concurrently; the first failure aborts the rest.
async fn download_images(ctx: &Context, job: &Job, dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    tokio::fs::create_dir_all(dir).await?;
    let executor = ctx.executor(None);
    let locale = ctx.settings.locale;

    let downloads = job.images.iter().enumerate().map(|(index, image)| {
        let executor = &executor;
        async move {
            let bytes = executor
                .execute(|| ctx.api.download_image(&image.url))
                .await
                .map_err(|e| CliError::Request(e.user_message(locale)))?;

            let path = dir.join(safe_file_name(&image.file_name(index), index));
            tokio::fs::write(&path, &bytes).await?;
            info!(path = %path.display(), bytes = bytes.len(), "image saved");
            Ok::<_, CliError>(path)
        }
    });

    futures::future::try_join_all(downloads).await
}

/// Keeps only the final path component so a server-supplied name cannot
/// escape the output directory
fn safe_file_name(name: &str, index: usize) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("image-{}.jpg", index + 1))
}

fn print_or_json<T: Serialize + ?Sized>(
    out: &mut impl Write,
    output: OutputArgs,
    value: &T,
    write_plain: fn(&mut dyn Write, &T) -> std::io::Result<()>,
) -> Result<(), CliError> {
    if output.json {
        serde_json::to_writer_pretty(&mut *out, value)?;
        writeln!(out)?;
    } else {
        write_plain(out, value)?;
    }
    Ok(())
}

fn write_jobs(out: &mut dyn Write, jobs: &[Job]) -> std::io::Result<()> {
    if jobs.is_empty() {
        return writeln!(out, "No jobs yet");
    }
    writeln!(
        out,
        "{:<24} {:<12} {:<16} {:>7} {:>6}  CREATED",
        "ID", "STATUS", "CATEGORY", "CREDITS", "IMAGES"
    )?;
    for job in jobs {
        writeln!(
            out,
            "{:<24} {:<12} {:<16} {:>7} {:>6}  {}",
            job.id,
            job.status.label(),
            job.category,
            job.credits_used,
            job.images.len(),
            job.created_at.format("%Y-%m-%d %H:%M")
        )?;
    }
    Ok(())
}

fn write_job(out: &mut dyn Write, job: &Job) -> std::io::Result<()> {
    writeln!(out, "Job:      {}", job.id)?;
    writeln!(out, "Status:   {}", job.status.label())?;
    writeln!(out, "Category: {}", job.category)?;
    writeln!(out, "Credits:  {}", job.credits_used)?;
    writeln!(out, "Created:  {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
    if let Some(updated) = job.updated_at {
        writeln!(out, "Updated:  {}", updated.format("%Y-%m-%d %H:%M:%S UTC"))?;
    }
    if let Some(ref reason) = job.error {
        writeln!(out, "Error:    {}", reason)?;
    }
    for (index, image) in job.images.iter().enumerate() {
        writeln!(out, "Image {}:  {}", index + 1, image.url)?;
    }
    Ok(())
}

fn write_categories(out: &mut dyn Write, categories: &[Category]) -> std::io::Result<()> {
    for category in categories {
        writeln!(
            out,
            "{:<16} {:<24} {:>3} credits  {}",
            category.id,
            category.name,
            category.credit_cost,
            category.description.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

fn write_credits(out: &mut dyn Write, balance: &CreditBalance) -> std::io::Result<()> {
    match balance.currency {
        Some(ref currency) => writeln!(out, "{} {}", balance.balance, currency),
        None => writeln!(out, "{} credits", balance.balance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_settings(api_url: String) -> Settings {
        let mut settings = Settings {
            api_url,
            rate_limit_ms: 0,
            ..Settings::default()
        };
        settings.retry.base_delay_ms = 1;
        settings.retry.max_delay_ms = 5;
        settings
    }

    fn context(server: &MockServer) -> Context {
        Context::new(fast_settings(server.uri())).expect("context should build")
    }

    fn command(args: &[&str]) -> Command {
        let mut argv = vec!["pixelflow"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv).command()
    }

    #[tokio::test]
    async fn test_dashboard_is_rejected_by_command_runner() {
        let server = MockServer::start().await;
        let mut out = Vec::new();

        let err = run(command(&["dashboard"]), &context(&server), &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Interactive));
        assert!(out.is_empty());
    }

    fn job_body(id: &str, status: &str, images: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "category": "portrait",
            "status": status,
            "created_at": "2026-01-05T10:00:00Z",
            "credits_used": 2,
            "images": images,
        })
    }

    #[tokio::test]
    async fn test_jobs_command_prints_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                job_body("job-1", "processing", serde_json::json!([]))
            ])))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        run(command(&["jobs"]), &context(&server), &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("job-1"));
        assert!(text.contains("processing"));
        assert!(text.contains("2026-01-05 10:00"));
    }

    #[tokio::test]
    async fn test_jobs_command_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/jobs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        run(command(&["jobs"]), &context(&server), &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap().trim(), "No jobs yet");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_credits_json_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"balance": 40})))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        run(command(&["credits", "--json"]), &context(&server), &mut out)
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["balance"], 40);
    }

    #[tokio::test]
    async fn test_failed_command_reports_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/nope"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Job not found"})),
            )
            .mount(&server)
            .await;

        let mut out = Vec::new();
        let err = run(command(&["job", "nope"]), &context(&server), &mut out)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Job not found");
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cached_categories_are_not_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/categories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": "vintage", "name": "Vintage", "credit_cost": 1}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = context(&server);
        for _ in 0..2 {
            let mut out = Vec::new();
            run(command(&["categories"]), &ctx, &mut out).await.unwrap();
            assert!(String::from_utf8(out).unwrap().contains("Vintage"));
        }
    }

    #[tokio::test]
    async fn test_watch_stops_at_terminal_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body(
                "j1",
                "processing",
                serde_json::json!([]),
            )))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/jobs/j1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body(
                "j1",
                "completed",
                serde_json::json!([]),
            )))
            .mount(&server)
            .await;

        let mut out = Vec::new();
        run(
            command(&["watch", "j1", "--interval", "1"]),
            &context(&server),
            &mut out,
        )
        .await
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("j1  processing"));
        assert!(text.contains("j1  completed"));
    }

    #[tokio::test]
    async fn test_download_saves_images() {
        let server = MockServer::start().await;
        let image_url = format!("{}/files/result.png", server.uri());
        Mock::given(method("GET"))
            .and(path("/api/jobs/j2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(job_body(
                "j2",
                "completed",
                serde_json::json!([{"url": image_url, "filename": "../../escape.png"}]),
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/files/result.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PNGDATA".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().to_str().unwrap().to_string();
        let mut out = Vec::new();
        run(command(&["download", "j2", "--out", &out_dir]), &context(&server), &mut out)
            .await
            .unwrap();

        let saved = dir.path().join("escape.png");
        assert_eq!(std::fs::read(&saved).unwrap(), b"PNGDATA");
    }

    #[test]
    fn test_safe_file_name_strips_directories() {
        assert_eq!(safe_file_name("../../etc/passwd", 0), "passwd");
        assert_eq!(safe_file_name("photo.jpg", 0), "photo.jpg");
        assert_eq!(safe_file_name("..", 1), "image-2.jpg");
    }

    #[test]
    fn test_write_credits_with_currency() {
        let mut out = Vec::new();
        write_credits(
            &mut out,
            &CreditBalance {
                balance: 7,
                currency: Some("EUR".to_string()),
            },
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "7 EUR\n");
    }

    #[test]
    fn test_handles_share_context_cache() {
        let ctx = Context::with_api(ApiClient::default(), Settings::default());
        ctx.cache
            .set(JOBS_KEY, &Vec::<Job>::new(), Duration::from_secs(60))
            .unwrap();

        let handle = ctx.handle::<Vec<Job>>(Some(JOBS_KEY));
        handle.clear_cache();

        assert!(ctx.cache.get::<Vec<Job>>(JOBS_KEY).is_none());
    }
}
