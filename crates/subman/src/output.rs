//! Plain-text tables for `list`.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use subman_core::status::ProductStatus;
use subman_core::types::{EntitlementGrant, Pool};

/// Left-aligned columns separated by two spaces, with a dashed rule under the header.
pub fn write_table(
    out: &mut dyn Write,
    headers: &[&str],
    rows: &[Vec<String>],
    empty: &str,
) -> io::Result<()> {
    if rows.is_empty() {
        return writeln!(out, "{empty}");
    }

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .max()
                .unwrap_or(0)
                .max(h.len())
        })
        .collect();

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    write_row(out, &header, &widths)?;
    write_row(out, &rule, &widths)?;
    for row in rows {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

fn write_row(out: &mut dyn Write, cells: &[String], widths: &[usize]) -> io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{cell:<w$}"))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(out, "{}", line.trim_end())
}

fn date(d: Option<DateTime<Utc>>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_status(out: &mut dyn Write, products: &[ProductStatus]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = products
        .iter()
        .map(|p| vec![p.product_name.clone(), p.status.to_string(), date(p.expires)])
        .collect();
    write_table(
        out,
        &["Product Installed", "Status", "Expires"],
        &rows,
        "No installed products found.",
    )
}

pub fn print_pools(out: &mut dyn Write, pools: &[Pool]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = pools
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.product_id.clone().unwrap_or_default(),
                p.product_name.clone().unwrap_or_default(),
                p.quantity.to_string(),
                p.consumed.to_string(),
                date(p.end_date),
            ]
        })
        .collect();
    write_table(
        out,
        &["Pool Id", "Product Id", "Product Name", "Quantity", "Consumed", "Expires"],
        &rows,
        "No available subscription pools.",
    )
}

pub fn print_consumed(out: &mut dyn Write, grants: &[EntitlementGrant]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = grants
        .iter()
        .map(|g| {
            vec![
                g.product_id().unwrap_or("-").to_string(),
                g.id.clone(),
                if g.is_active { "True" } else { "False" }.to_string(),
                date(g.start_date),
                date(g.end_date),
            ]
        })
        .collect();
    write_table(
        out,
        &["Product Consumed", "Entitlement Id", "Active", "Starts", "Expires"],
        &rows,
        "No consumed subscriptions.",
    )
}
