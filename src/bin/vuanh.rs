//! vuanh CLI - drive the site's offline caches and contact form queue.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use vuanh_offline::{
    AppConfig, AssetCacheController, Catalog, DiskCacheStore, FetchResponse, FileStorage,
    FormValues, Request, ReqwestNetwork, StatusMessage, SubmissionQueue, SystemClock,
    normalize_language,
};

// ============================================================================
// CLI Configuration
// ============================================================================

enum Command {
    Install,
    Fetch { url: String, navigate: bool },
    Purge,
    Queue,
    Replay,
    Submit { form: FormValues, offline: bool },
}

fn print_usage() {
    eprintln!("Usage: vuanh <COMMAND> [OPTIONS]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install                  Precache the current asset generation and activate it");
    eprintln!("  fetch <url>              Serve a request through the cache controller");
    eprintln!("      --navigate           Treat the request as a page navigation");
    eprintln!("  purge                    Delete every cache");
    eprintln!("  queue                    List queued form submissions");
    eprintln!("  replay                   Deliver queued form submissions now");
    eprintln!("  submit                   Submit the contact form");
    eprintln!("      --name <NAME>        (required)");
    eprintln!("      --email <EMAIL>      (required)");
    eprintln!("      --message <TEXT>     (required)");
    eprintln!("      --phone <PHONE>");
    eprintln!("      --product <PRODUCT>");
    eprintln!("      --lang <vi|en>");
    eprintln!("      --offline            Report the client as offline (failures are queued)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  VUANH_CONFIG             Path to config.toml");
    eprintln!("  STATE_DIRECTORY          Directory for caches and queued submissions");
    eprintln!("  RUST_LOG                 Log filter (e.g. info, vuanh_offline=debug)");
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn take_value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    args.get(*i)
        .cloned()
        .unwrap_or_else(|| fail(&format!("{flag} requires a value")))
}

fn parse_args() -> Command {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(if args.is_empty() { 1 } else { 0 });
    }

    let rest = &args[1..];
    match args[0].as_str() {
        "install" => Command::Install,
        "purge" => Command::Purge,
        "queue" => Command::Queue,
        "replay" => Command::Replay,
        "fetch" => {
            let mut url = None;
            let mut navigate = false;
            for arg in rest {
                match arg.as_str() {
                    "--navigate" => navigate = true,
                    a if !a.starts_with('-') && url.is_none() => url = Some(a.to_string()),
                    other => fail(&format!("unexpected argument: {other}")),
                }
            }
            Command::Fetch {
                url: url.unwrap_or_else(|| fail("fetch requires a URL")),
                navigate,
            }
        }
        "submit" => {
            let mut form = FormValues::default();
            let mut offline = false;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--name" => form.name = take_value(rest, &mut i, "--name"),
                    "--email" => form.email = take_value(rest, &mut i, "--email"),
                    "--phone" => form.phone = take_value(rest, &mut i, "--phone"),
                    "--product" => form.product = take_value(rest, &mut i, "--product"),
                    "--message" => form.message = take_value(rest, &mut i, "--message"),
                    "--lang" => form.language = Some(take_value(rest, &mut i, "--lang")),
                    "--offline" => offline = true,
                    other => fail(&format!("unknown option: {other}")),
                }
                i += 1;
            }
            Command::Submit { form, offline }
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            std::process::exit(1);
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn build_network() -> vuanh_offline::Result<Arc<ReqwestNetwork>> {
    let http = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .timeout(Duration::from_secs(30))
        .build()?;
    Ok(Arc::new(ReqwestNetwork::new(http)))
}

async fn open_queue(
    config: &AppConfig,
    network: Arc<ReqwestNetwork>,
) -> SubmissionQueue<FileStorage, Arc<ReqwestNetwork>, SystemClock> {
    let storage = FileStorage::new(config.storage.kv_dir());
    log::debug!("Submission queue stored in {}", storage.dir().display());
    SubmissionQueue::open(storage, network, SystemClock, config).await
}

/// Built-in strings, overlaid with the site's cached locale files.
async fn load_catalog(
    controller: &AssetCacheController<DiskCacheStore, Arc<ReqwestNetwork>>,
    config: &AppConfig,
    language: &str,
) -> Catalog {
    let mut catalog = Catalog::builtin(config.site.default_language.clone());
    for lang in ["vi", "en"] {
        let path = format!("/locales/{lang}.json");
        let Some(response) = controller.cached_asset(&path).await else {
            continue;
        };
        let loaded = std::str::from_utf8(&response.body)
            .map_err(|e| e.to_string())
            .and_then(|json| catalog.insert_json(lang, json).map_err(|e| e.to_string()));
        if let Err(e) = loaded {
            log::warn!("Ignoring cached {path}: {e}");
        }
    }
    catalog.with_language(language)
}

async fn fetch(
    controller: &AssetCacheController<DiskCacheStore, Arc<ReqwestNetwork>>,
    url: String,
    navigate: bool,
) -> vuanh_offline::Result<()> {
    controller.resume().await?;
    let request = if navigate {
        Request::navigate(url)
    } else {
        Request::get(url)
    };

    match controller.handle_fetch(&request).await {
        FetchResponse::Passthrough => println!("Not intercepted: {}", request.url),
        FetchResponse::Respond(response) => {
            println!("{} {}", response.status, response.status_text);
            for (name, value) in &response.headers {
                println!("{name}: {value}");
            }
            println!();
            println!("({} bytes)", response.body.len());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> vuanh_offline::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = parse_args();
    let config = AppConfig::load()?;
    let network = build_network()?;
    let controller = AssetCacheController::new(
        DiskCacheStore::new(config.storage.cache_dir()),
        Arc::clone(&network),
        &config,
    );

    match command {
        Command::Install => {
            controller.start().await?;
            println!(
                "Installed {} ({} assets) in {}",
                config.cache.precache_name(),
                config.cache.precache.len(),
                controller.cache().root().display()
            );
        }
        Command::Fetch { url, navigate } => fetch(&controller, url, navigate).await?,
        Command::Purge => {
            let deleted = controller.purge_all().await?;
            println!(
                "Deleted {deleted} cache(s) from {}",
                controller.cache().root().display()
            );
        }
        Command::Queue => {
            let queue = open_queue(&config, network).await;
            let pending = queue.pending();
            if pending.is_empty() {
                println!("No queued submissions");
            }
            for submission in pending {
                println!(
                    "{}  {}  {} <{}>  [{}]",
                    submission.id,
                    submission.created_at.format("%Y-%m-%d %H:%M:%S"),
                    submission.name,
                    submission.email,
                    submission.language
                );
            }
        }
        Command::Replay => {
            let queue = open_queue(&config, network).await;
            let report = queue.on_connectivity_restored().await;
            println!(
                "Delivered {} of {} attempted, {} still queued",
                report.delivered, report.attempted, report.remaining
            );
        }
        Command::Submit { form, offline } => {
            network.set_online(!offline);
            let language = normalize_language(form.language.as_deref())
                .unwrap_or_else(|| config.site.default_language.clone());
            let catalog = load_catalog(&controller, &config, &language).await;

            let queue = open_queue(&config, network).await;
            let result = queue.submit(&form).await;
            let status = StatusMessage::from_submission(&result, &catalog);
            println!("[{}] {}", status.severity.as_str(), status.text);
            if let Err(e) = result {
                log::debug!("Submission failed: {e}");
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
