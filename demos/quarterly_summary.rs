use std::error::Error;
use vat_box_summary::{summarize_grids, CellValue, EngineConfig};

fn month_grid(title: &str, headers: &[&str], rows: &[(&str, &str, &str)]) -> Vec<Vec<CellValue>> {
    let mut grid = vec![vec![CellValue::from(title)], vec![]];
    grid.push(headers.iter().map(|h| CellValue::from(*h)).collect());
    for (net, vat, code) in rows {
        grid.push(vec![(*net).into(), (*vat).into(), (*code).into()]);
    }
    grid
}

fn main() -> Result<(), Box<dyn Error>> {
    let grids = vec![
        (
            "Jan 2024",
            month_grid(
                "Output tax register - January",
                &["Supply/Purchase Value ", "VAT Value ", "Box"],
                &[
                    ("12,500.00", "625.00", "Box 1"),
                    ("(1,000.00)", "(50.00)", "A"),
                    ("4,200.00", "0.00", "B"),
                ],
            ),
        ),
        (
            "Feb 2024",
            month_grid(
                "February",
                &["Sales Amt", "Tax", "VAT Box"],
                &[("AED 8,000", "400", ""), ("2,000", "100", "6"), ("", "", "")],
            ),
        ),
        (
            "Mar 2024",
            month_grid(
                "March",
                &["Net Amount", "VAT Amount", "FTA Box"],
                &[("5,000", "250", "a"), ("750", "37.50", "z")],
            ),
        ),
    ];

    let config = EngineConfig::default();
    let report = summarize_grids(grids, &config)?;

    println!("VAT box summary");
    println!("===============\n");
    for summary in &report.periods {
        println!(
            "{} ({} transactions, {} skipped rows)",
            summary.period, summary.transaction_count, summary.skipped_row_count
        );
        for (code, total) in &summary.totals {
            let label = config.boxes.description(code).unwrap_or("");
            println!(
                "  Box {:<2} {:<42} net {:>12.2}  vat {:>10.2}",
                code, label, total.amount, total.vat
            );
        }
        if summary.unassigned.transaction_count > 0 {
            println!(
                "  Unassigned ({} rows)                          net {:>12.2}  vat {:>10.2}",
                summary.unassigned.transaction_count,
                summary.unassigned.amount,
                summary.unassigned.vat
            );
        }
        println!();
    }

    for failure in &report.failures {
        println!("Skipped sheet {}: {}", failure.period, failure.reason);
    }

    if let Some(total) = report.grand_total("Q1 2024")? {
        println!("Q1 net VAT payable: {:.2}", total.total("D").map(|d| d.vat).unwrap_or_default());
    }

    println!("\n{}", report.to_csv());
    Ok(())
}
