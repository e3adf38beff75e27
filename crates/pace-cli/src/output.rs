use serde::Serialize;

/// Cells wider than this are cut with `...`.
const MAX_CELL: usize = 72;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    for line in render_table(headers, rows) {
        println!("{line}");
    }
}

fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> Vec<String> {
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| row.into_iter().map(truncate).collect())
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let header: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(join_padded(&header, &widths));
    out.push(join_padded(&sep, &widths));
    for row in &rows {
        out.push(join_padded(row, &widths));
    }
    out
}

/// Pad every column but the last, so lines carry no trailing blanks.
fn join_padded(cells: &[String], widths: &[usize]) -> String {
    let last = cells.len().saturating_sub(1);
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            if i == last {
                cell.clone()
            } else {
                format!("{cell:w$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn truncate(cell: String) -> String {
    if cell.chars().count() <= MAX_CELL {
        return cell;
    }
    let cut: String = cell.chars().take(MAX_CELL - 3).collect();
    format!("{cut}...")
}
