use crate::output::print_json;
use pipette_core::well;

/// Accepts either form: a number is treated as a tip index, anything else as
/// a well label.
pub fn run(value: &str, json: bool) -> anyhow::Result<()> {
    let (label, index) = match value.trim().parse::<u32>() {
        Ok(index) => (well::to_label(index)?, index),
        Err(_) => (well::normalize(value)?, well::to_index(value)?),
    };

    if json {
        print_json(&serde_json::json!({ "label": label, "index": index }))?;
    } else {
        println!("{label} = {index}");
    }
    Ok(())
}
