//! Wiki and knowledge base commands

use anyhow::Result;
use clap::Subcommand;

use super::utils::{parse_csv, preview};
use super::Workspace;
use crate::{knowledge, wiki};

const PREVIEW_CHARS: usize = 80;

#[derive(Subcommand)]
pub enum WikiCommand {
    /// Create a page (PATH defaults to the slugified title)
    Create {
        title: String,
        content: String,
        #[arg(long)]
        path: Option<String>,
        /// Id of the parent page
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Show a page by path, or by title when no path matches
    Get { page: String },
    /// Replace the content of a page
    Edit { path: String, content: String },
    /// List pages
    List {
        #[arg(long)]
        parent: Option<i64>,
    },
    /// Search titles and content
    Search { query: String },
    /// Page count and sizes
    Stats,
    /// Import the configured documentation files as pages
    Populate,
}

#[derive(Subcommand)]
pub enum KbCommand {
    /// Add a knowledge entry
    Add {
        category: String,
        title: String,
        content: String,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Search titles, content and tags
    Search { query: String },
    /// List categories, or the entries of one category
    List {
        #[arg(long)]
        category: Option<String>,
    },
}

pub fn run(cmd: WikiCommand, ws: &mut Workspace) -> Result<()> {
    match cmd {
        WikiCommand::Create { title, content, path, parent } => {
            let path = path.unwrap_or_else(|| wiki::slugify(&title));
            match wiki::create(&ws.conn, &path, &title, &content, parent)? {
                Some(id) => println!("✓ Page #{id} created at {path}"),
                None => anyhow::bail!("A page already exists at {}", path),
            }
        }
        WikiCommand::Get { page } => {
            let found = match wiki::get(&ws.conn, &page)? {
                Some(p) => Some(p),
                None => wiki::find_by_title(&ws.conn, &page)?,
            };
            let Some(p) = found else {
                anyhow::bail!("No wiki page matching '{}'", page);
            };
            println!("{} ({})", p.title, p.path);
            println!("Updated: {}\n", p.updated_at);
            println!("{}", p.content);
        }
        WikiCommand::Edit { path, content } => {
            if !wiki::update(&ws.conn, &path, &content)? {
                anyhow::bail!("No wiki page at {}", path);
            }
            println!("✓ Page {path} updated");
        }
        WikiCommand::List { parent } => {
            let pages = wiki::list(&ws.conn, parent)?;
            if pages.is_empty() {
                println!("No wiki pages.");
            }
            for p in pages {
                println!("#{:<4} {:<30} {}", p.id, p.path, p.title);
            }
        }
        WikiCommand::Search { query } => {
            let pages = wiki::search(&ws.conn, &query)?;
            if pages.is_empty() {
                println!("No results found.");
            }
            for p in pages {
                println!("{} ({})", p.title, p.path);
                println!("   {}", preview(&p.content, PREVIEW_CHARS));
            }
        }
        WikiCommand::Stats => {
            let stats = wiki::stats(&ws.conn)?;
            println!("Pages:        {}", stats.pages);
            println!("Total size:   {} bytes", stats.total_bytes);
            println!("Average size: {} bytes", stats.average_bytes());
            if let (Some(oldest), Some(newest)) = (&stats.oldest, &stats.newest) {
                println!("Oldest:       {oldest}");
                println!("Newest:       {newest}");
            }
        }
        WikiCommand::Populate => {
            let report = wiki::populate(&mut ws.conn, &ws.config.docs_root, &ws.config.wiki_docs)?;
            for title in &report.added {
                println!("✓ Added {title}");
            }
            for title in &report.updated {
                println!("✓ Updated {title}");
            }
            for file in &report.missing {
                println!("⊘ Missing {file}");
            }
            println!(
                "\n{} added, {} updated, {} missing",
                report.added.len(),
                report.updated.len(),
                report.missing.len()
            );
        }
    }
    Ok(())
}

pub fn run_kb(cmd: KbCommand, ws: &Workspace) -> Result<()> {
    let conn = &ws.conn;
    match cmd {
        KbCommand::Add { category, title, content, tags } => {
            let id = knowledge::add(conn, &category, &title, &content, &parse_csv(&tags))?;
            println!("✓ Knowledge entry #{id} added to {category}");
        }
        KbCommand::Search { query } => {
            let entries = knowledge::search(conn, &query)?;
            if entries.is_empty() {
                println!("No results found.");
            }
            for e in entries {
                println!("[{}] {}", e.category, e.title);
                println!("   {}", preview(&e.content, PREVIEW_CHARS));
            }
        }
        KbCommand::List { category: None } => {
            let categories = knowledge::categories(conn)?;
            if categories.is_empty() {
                println!("Knowledge base is empty.");
            }
            for c in categories {
                println!("{c}");
            }
        }
        KbCommand::List { category: Some(category) } => {
            for e in knowledge::by_category(conn, &category)? {
                let tags = if e.tags.is_empty() { String::new() } else { format!(" [{}]", e.tags.join(", ")) };
                println!("#{:<4} {}{}", e.id, e.title, tags);
            }
        }
    }
    Ok(())
}
