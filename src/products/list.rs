use anyhow::Result;
use chrono::{DateTime, Local};
use dialoguer::console::style;

use crate::error::ClientError;
use crate::http::ApiClient;
use crate::ui::{
    apply_column_padding, header, print_command_status, styled_table, truncate, with_spinner,
    CommandStatus,
};
use crate::utils::counted;

use super::api::{PageQuery, Product, ProductSource};
use super::feed::{FeedEvent, FeedEvents, ProductFeed};
use super::page::ResultPage;

fn header_row() -> String {
    format!("{:<8} {:<20} {:<32} {}", "ID", "SKU", "Name", "Active")
}

pub(super) fn product_row(product: &Product) -> String {
    let active = if product.active {
        style("yes").green().to_string()
    } else {
        style("no").dim().to_string()
    };
    format!(
        "{:<8} {:<20} {:<32} {active}",
        product.id,
        truncate(&product.sku, 20),
        truncate(&product.name, 32),
    )
}

/// `Showing items X – Y of N` and `Page P of T`, or a single empty-result line.
pub(super) fn footer_lines(page: &ResultPage) -> Vec<String> {
    if page.total_items == 0 {
        return vec!["No products found".to_string()];
    }
    vec![
        format!(
            "Showing items {} – {} of {}",
            page.start_item(),
            page.end_item(),
            page.total_items
        ),
        format!("Page {} of {}", page.query().page, page.total_pages()),
    ]
}

fn print_footer(page: &ResultPage) {
    println!();
    for line in footer_lines(page) {
        println!("{}", style(line).dim());
    }
    if page.skipped_lines > 0 {
        print_command_status(
            CommandStatus::Warning,
            &format!(
                "Skipped {} that could not be parsed",
                counted(page.skipped_lines as u64, "line")
            ),
        );
    }
}

/// Server timestamps are RFC 3339; show them in local time, or as sent.
fn format_timestamp(raw: Option<&str>) -> String {
    match raw {
        None => "-".to_string(),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| raw.to_string()),
    }
}

/// Render an already-loaded page.
pub(super) fn print_page(page: &ResultPage) {
    if !page.records.is_empty() {
        let mut table = styled_table();
        table.set_header(vec![
            header("ID"),
            header("SKU"),
            header("Name"),
            header("Active"),
            header("Updated"),
        ]);
        apply_column_padding(&mut table, (0, 2));
        for product in &page.records {
            table.add_row(vec![
                product.id.to_string(),
                truncate(&product.sku, 20),
                truncate(&product.name, 32),
                (if product.active { "yes" } else { "no" }).to_string(),
                format_timestamp(product.updated_at.as_deref()),
            ]);
        }
        println!("{table}");
    }
    print_footer(page);
}

/// Load `query` and print each record the moment it is decoded.
pub(super) async fn stream_page<S: ProductSource>(
    feed: &mut ProductFeed<S>,
    events: &mut FeedEvents,
    query: PageQuery,
    json: bool,
) -> Result<ResultPage> {
    let generation = with_spinner("Loading products...", feed.load(query)).await?;

    let mut header_printed = false;
    while let Some((event_generation, event)) = events.recv().await {
        if event_generation != generation {
            continue;
        }
        match event {
            FeedEvent::Record(product) => {
                if json {
                    println!("{}", serde_json::to_string(&product)?);
                    continue;
                }
                if !header_printed {
                    println!("{}", style(header_row()).bold().dim());
                    header_printed = true;
                }
                println!("{}", product_row(&product));
            }
            FeedEvent::Finished => break,
            FeedEvent::Failed(reason) => return Err(ClientError::QueryTransport(reason).into()),
        }
    }

    feed.wait().await;
    let page = feed.snapshot();
    if !json {
        print_footer(&page);
    }
    Ok(page)
}

pub async fn run(client: ApiClient, query: PageQuery, json: bool) -> Result<()> {
    let (mut feed, mut events) = ProductFeed::new(client, query.clone());
    match stream_page(&mut feed, &mut events, query, json).await {
        Ok(_) => Ok(()),
        Err(err) => {
            print_command_status(CommandStatus::Error, "Failed to load products");
            Err(err)
        }
    }
}
