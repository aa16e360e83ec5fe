use std::error::Error;
use std::time::Duration;
use vat_box_summary::{
    with_store, CellValue, EngineConfig, PeriodRange, RawSheet, SheetPipeline, SummaryStore,
};

fn main() -> Result<(), Box<dyn Error>> {
    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "vat_summary.db".to_string());

    let pipeline = SheetPipeline::new(EngineConfig::default())?;
    let sheets = vec![
        RawSheet::from_grid(
            "Jan 2024",
            vec![
                vec!["Net".into(), "Tax".into(), "Box".into()],
                vec![CellValue::from(1000i64), 50i64.into(), "A".into()],
                vec![CellValue::from(400i64), 20i64.into(), "C".into()],
            ],
        ),
        RawSheet::from_grid(
            "Feb 2024",
            vec![
                vec!["Purchase Value".into(), "VAT Amount".into()],
                vec![CellValue::from(600i64), 30i64.into()],
            ],
        ),
    ];
    let report = pipeline.run(&sheets)?;

    // Running this twice leaves the database unchanged: every write is an upsert.
    with_store(&db_path, Duration::from_secs(5), |store| {
        pipeline.persist(&report, store)
    })?;

    let stored = with_store(&db_path, Duration::from_secs(5), |store| {
        store.fetch_summaries(&PeriodRange::between("Jan 2024", "Dec 2024"))
    })?;

    println!("Stored summaries in {}:", db_path);
    for summary in stored {
        println!("  {}", summary.period);
        for (code, total) in &summary.totals {
            println!("    Box {}: net {} vat {}", code, total.amount, total.vat);
        }
    }
    Ok(())
}
