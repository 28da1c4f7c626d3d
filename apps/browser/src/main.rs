use std::{collections::HashSet, path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{
    AffordanceVisibility, ControllerEvent, FlagReconciler, HttpSearchClient, NavigationOutcome,
    PaginationController, PaginationView, SearchOutcome,
};
use flag_integration::LocalFlagClient;
use shared::domain::{Affordance, MAX_VISIBLE_PAGES};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{broadcast, broadcast::error::RecvError},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod render;

use commands::{parse_command, Command, HELP};
use config::load_settings_from;
use render::{render_description, render_pagination, render_results, render_stats};

#[derive(Parser, Debug)]
#[command(about = "Terminal client for the book search proxy")]
struct Args {
    #[arg(long, default_value = "browser.toml")]
    config: PathBuf,
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    user_key: Option<String>,
    /// TOML file with a `[flags]` table of boolean feature flags.
    #[arg(long)]
    flags_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings_from(&args.config, |key: &str| std::env::var(key).ok());
    if let Some(v) = args.server_url {
        settings.search_base_url = v;
    }
    if let Some(v) = args.user_key {
        settings.user_key = v;
    }
    if let Some(v) = args.flags_file {
        settings.flags_file = Some(v);
    }

    let client = Arc::new(HttpSearchClient::new(&settings.search_base_url)?);
    let flags = Arc::new(match &settings.flags_file {
        Some(path) => LocalFlagClient::from_file(settings.user_key.clone(), path)?,
        None => LocalFlagClient::new(settings.user_key.clone()),
    });
    info!(
        server = %client.base_url(),
        user_key = flags.user_key(),
        "browser: starting"
    );

    let reconciler = FlagReconciler::new(flags.clone());
    let visibility_updates = reconciler.subscribe();
    let reconciler_task = reconciler.spawn();
    flags.mark_ready();

    let controller = PaginationController::new_with_dependencies(
        client.clone(),
        client,
        flags.clone(),
        MAX_VISIBLE_PAGES,
    );
    let printer = tokio::spawn(print_updates(
        controller.subscribe_events(),
        visibility_updates,
    ));

    println!("{HELP}");
    let mut expanded: HashSet<(String, u32, usize)> = HashSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };

        match command {
            Command::Search(text) => {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    if controller.submit_query(&text).await == SearchOutcome::Failed {
                        println!("search for \"{text}\" failed");
                    }
                });
            }
            Command::Next => navigate(&controller, |c| async move { c.navigate_next().await }),
            Command::Prev => navigate(&controller, |c| async move { c.navigate_prev().await }),
            Command::First => {
                if !reconciler.visibility().await.is_visible(Affordance::FirstPage) {
                    println!("jump to first page is not enabled");
                    continue;
                }
                navigate(&controller, |c| async move { c.navigate_first().await });
            }
            Command::Last => {
                if !reconciler.visibility().await.is_visible(Affordance::LastPage) {
                    println!("jump to last page is not enabled");
                    continue;
                }
                navigate(&controller, |c| async move { c.navigate_last().await });
            }
            Command::Page(page) => {
                navigate(&controller, move |c| async move { c.select_page_number(page).await })
            }
            Command::Open(position) => {
                let snapshot = controller.snapshot().await;
                let Some(page) = snapshot.displayed_page else {
                    println!("no results to open");
                    continue;
                };
                let books = controller.cached_page(page).await.unwrap_or_default();
                let Some(book) = position.checked_sub(1).and_then(|i| books.get(i)) else {
                    println!("no result {position} on page {page}");
                    continue;
                };
                if expanded.insert((snapshot.query.clone(), page, position)) {
                    println!("{}", render_description(position, book));
                } else {
                    expanded.remove(&(snapshot.query, page, position));
                    println!("{position}. {} (collapsed)", book.title);
                }
            }
            Command::Flag { key, enabled } => {
                flags.set_flag(&key, enabled);
                println!("flag {key} = {enabled}");
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    printer.abort();
    reconciler_task.abort();
    Ok(())
}

/// Runs a navigation on its own task so the prompt stays responsive while a
/// page is being fetched.
fn navigate<F, Fut>(controller: &Arc<PaginationController>, action: F)
where
    F: FnOnce(Arc<PaginationController>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = NavigationOutcome> + Send + 'static,
{
    let controller = Arc::clone(controller);
    tokio::spawn(async move {
        match action(controller).await {
            NavigationOutcome::Ignored => println!("nothing to navigate to"),
            NavigationOutcome::Failed { escalated } => {
                if escalated {
                    println!("could not load page; the failure has been reported");
                } else {
                    println!("could not load page");
                }
            }
            NavigationOutcome::CacheHit
            | NavigationOutcome::Fetched
            | NavigationOutcome::InFlight
            | NavigationOutcome::Stale => {}
        }
    });
}

async fn print_updates(
    mut events: broadcast::Receiver<ControllerEvent>,
    mut visibility_updates: broadcast::Receiver<AffordanceVisibility>,
) {
    let mut visibility = AffordanceVisibility::default();
    let mut last_view: Option<PaginationView> = None;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ControllerEvent::SearchStarted { query }) => {
                    last_view = None;
                    println!("searching for \"{query}\"...");
                }
                Ok(ControllerEvent::StatsPublished(stats)) => println!("{}", render_stats(&stats)),
                Ok(ControllerEvent::ResultsRendered { page, books }) => {
                    println!("{}", render_results(page, &books));
                }
                Ok(ControllerEvent::PaginationUpdated(view)) => {
                    println!("{}", render_pagination(&view, visibility));
                    last_view = Some(view);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "browser: controller events lagged");
                }
                Err(RecvError::Closed) => break,
            },
            update = visibility_updates.recv() => match update {
                Ok(next) => {
                    visibility = next;
                    if let Some(view) = &last_view {
                        println!("{}", render_pagination(view, visibility));
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
        }
    }
}
