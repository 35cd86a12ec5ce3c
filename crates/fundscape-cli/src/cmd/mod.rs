pub mod fetch;
pub mod inspect;
pub mod serve;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Config;

fn styled_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header.iter().map(|h| Cell::new(h).fg(Color::Cyan)));
    table
}

/// Two-column key/value table on stderr
pub(crate) fn print_summary(title: &str, rows: &[(&str, String)]) {
    let mut table = styled_table(&[title, "Value"]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

/// `fundscape config`: effective configuration after file and defaults
pub fn show_config(config: &Config) {
    let http = &config.http;
    let collect = &config.collect;
    print_summary(
        "Setting",
        &[
            ("Table path", config.output.table_path.display().to_string()),
            (
                "Compression level",
                config.output.compression_level.to_string(),
            ),
            ("OpenAlex URL", config.openalex.base_url.clone()),
            (
                "Mailto",
                config
                    .openalex
                    .mailto
                    .clone()
                    .unwrap_or_else(|| "not set".to_string()),
            ),
            ("Country", collect.country_code.clone()),
            (
                "Years",
                format!("{}-{}", collect.start_year, collect.end_year),
            ),
            ("Funding filter", collect.funding.to_string()),
            (
                "Caps",
                format!(
                    "{} subfields / {} funders / {} topics",
                    collect.subfields, collect.funders, collect.topics
                ),
            ),
            ("Read timeout", format!("{}s", http.read_timeout)),
            ("Max retries", http.max_retries.to_string()),
            (
                "Request budget",
                format!("{} per {}s", http.max_requests, http.per_seconds),
            ),
            ("Listen", config.server.listen.to_string()),
        ],
    );
}
