use std::io::IsTerminal;

use anyhow::{bail, Result};

use crate::http::ApiClient;
use crate::ui::{fuzzy_select, print_command_status, text_input, CommandStatus};

use super::api::{ActiveFilter, PageQuery, ProductSource};
use super::feed::{FeedEvents, ProductFeed};
use super::list::{print_page, product_row, stream_page};
use super::page::ResultPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Next,
    Previous,
    PageSize,
    Sku,
    Active,
    Toggle,
    Reload,
    Quit,
}

impl Action {
    fn label(self) -> &'static str {
        match self {
            Action::Next => "Next page",
            Action::Previous => "Previous page",
            Action::PageSize => "Change page size",
            Action::Sku => "Filter by SKU",
            Action::Active => "Filter by active flag",
            Action::Toggle => "Toggle a product's active flag",
            Action::Reload => "Reload",
            Action::Quit => "Quit",
        }
    }
}

/// Actions that make sense for the page on screen.
fn available_actions(page: &ResultPage) -> Vec<Action> {
    let mut actions = Vec::new();
    if page.has_next() {
        actions.push(Action::Next);
    }
    if page.has_prev() {
        actions.push(Action::Previous);
    }
    actions.extend([Action::PageSize, Action::Sku, Action::Active]);
    if !page.records.is_empty() {
        actions.push(Action::Toggle);
    }
    actions.extend([Action::Reload, Action::Quit]);
    actions
}

async fn show<S: ProductSource>(
    feed: &mut ProductFeed<S>,
    events: &mut FeedEvents,
    query: PageQuery,
) {
    println!();
    if let Err(err) = stream_page(feed, events, query, false).await {
        print_command_status(CommandStatus::Error, &format!("Failed to load products: {err:#}"));
    }
}

async fn toggle<S: ProductSource>(feed: &ProductFeed<S>, page: &ResultPage) -> Result<()> {
    let labels: Vec<String> = page.records.iter().map(product_row).collect();
    let selected = fuzzy_select("Toggle which product", &labels)?;
    let product = &page.records[selected];

    match feed.set_active(product.id, !product.active).await {
        Ok(change) => {
            let state = if change.active { "active" } else { "inactive" };
            print_command_status(
                CommandStatus::Success,
                &format!("'{}' is now {state}", product.name),
            );
            print_page(&feed.snapshot());
        }
        Err(err) => print_command_status(CommandStatus::Error, &err.to_string()),
    }
    Ok(())
}

pub async fn run(client: ApiClient, query: PageQuery) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        bail!("interactive mode requires TTY. Use `acme products list` instead");
    }

    let (mut feed, mut events) = ProductFeed::new(client, query.clone());
    show(&mut feed, &mut events, query).await;

    loop {
        let page = feed.snapshot();
        let current = page.query().clone();
        let actions = available_actions(&page);
        let labels: Vec<&str> = actions.iter().map(|a| a.label()).collect();

        let next = match actions[fuzzy_select("Action", &labels)?] {
            Action::Next => current.with_page(current.page + 1),
            Action::Previous => current.with_page(current.page - 1),
            Action::PageSize => {
                let raw = text_input("Products per page", &current.limit.to_string())?;
                match raw.parse::<u32>() {
                    Ok(limit) if limit >= 1 => current.with_limit(limit),
                    _ => {
                        print_command_status(
                            CommandStatus::Warning,
                            &format!("'{raw}' is not a positive number"),
                        );
                        continue;
                    }
                }
            }
            Action::Sku => {
                let sku = text_input("SKU (empty for all)", current.sku.as_deref().unwrap_or(""))?;
                current.with_filters(Some(sku), current.active)
            }
            Action::Active => {
                let filters = [ActiveFilter::All, ActiveFilter::Active, ActiveFilter::Inactive];
                let names: Vec<&str> = filters.iter().map(|f| f.label()).collect();
                let selected = fuzzy_select("Show", &names)?;
                current.with_filters(current.sku.clone(), filters[selected])
            }
            Action::Toggle => {
                toggle(&feed, &page).await?;
                continue;
            }
            Action::Reload => current,
            Action::Quit => break,
        };
        show(&mut feed, &mut events, next).await;
    }

    feed.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::api::Product;

    fn loaded(page: u32, total: u64, records: usize) -> ResultPage {
        let query = PageQuery::new(page, 10);
        let mut result = ResultPage::new(query.clone());
        let generation = result.begin(query);
        result.set_total(generation, Some(total));
        for id in 0..records as i64 {
            result.push(
                generation,
                Product {
                    id,
                    name: format!("P{id}"),
                    sku: format!("s{id}"),
                    description: String::new(),
                    active: true,
                    created_at: None,
                    updated_at: None,
                },
            );
        }
        result
    }

    #[test]
    fn first_page_offers_next_but_not_previous() {
        let actions = available_actions(&loaded(1, 37, 10));
        assert!(actions.contains(&Action::Next));
        assert!(!actions.contains(&Action::Previous));
        assert!(actions.contains(&Action::Toggle));
    }

    #[test]
    fn last_page_offers_previous_only() {
        let actions = available_actions(&loaded(4, 37, 7));
        assert!(!actions.contains(&Action::Next));
        assert!(actions.contains(&Action::Previous));
    }

    #[test]
    fn empty_page_cannot_toggle() {
        let actions = available_actions(&loaded(1, 0, 0));
        assert_eq!(
            actions,
            vec![
                Action::PageSize,
                Action::Sku,
                Action::Active,
                Action::Reload,
                Action::Quit
            ]
        );
    }
}
