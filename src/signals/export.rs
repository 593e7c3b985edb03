//! CSV export of signals.
//!
//! UTF-8 with BOM so spreadsheet tools pick up the encoding; every field is
//! quoted, embedded quotes doubled.

use crate::models::TradingSignal;

const BOM: &str = "\u{feff}";
const HEADER: &str = "timestamp,stock_code,stock_name,stock_price,etf_code,etf_name,etf_weight,confidence,risk_level,reason";

fn quote_field(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn signals_to_csv(signals: &[TradingSignal]) -> String {
    let mut out = String::with_capacity(64 + signals.len() * 128);
    out.push_str(BOM);
    for (i, column) in HEADER.split(',').enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&quote_field(column));
    }
    out.push('\n');

    for signal in signals {
        let fields = [
            signal.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            signal.stock_code.clone(),
            signal.stock_name.clone(),
            format!("{:.2}", signal.stock_price),
            signal.etf_code.clone(),
            signal.etf_name.clone(),
            format!("{:.4}", signal.weight),
            signal.confidence_level.as_str().to_string(),
            signal.risk_level.as_str().to_string(),
            signal.reason.clone(),
        ];
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&quote_field(field));
        }
        out.push('\n');
    }
    out
}
