use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::protocol::ResultMessage;
use crate::result::NestedArray;


/// Write the result message to `path` as pretty-printed JSON.
pub fn write_portrait(result: &ResultMessage, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, result).context("encoding portrait")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Human readable overview of a result.
pub fn summary(result: &ResultMessage) -> String {
    let info = &result.info_abs_eout;
    let dims = match result.dimension_type {
        -1 => "single cell".to_string(),
        d => format!("{}D", d + 1),
    };
    let axes = info
        .axes
        .iter()
        .zip(&info.shape)
        .zip(&info.steps)
        .map(|((name, n), step)| format!("{name}: {n} x {step} m"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        concat!(
            "Portrait {} ({}), {} cells [{}]\n",
            "  |E| min {:.6e} max {:.6e}\n",
            "  |E|^2 min {:.6e} max {:.6e}"
        ),
        result.id,
        dims,
        num_values(&result.abs_eout),
        axes,
        info.min,
        info.max,
        result.info_norm_eout.min,
        result.info_norm_eout.max,
    )
}

fn num_values(values: &NestedArray) -> usize {
    match values {
        NestedArray::D1(v) => v.len(),
        NestedArray::D2(v) => v.iter().map(Vec::len).sum(),
        NestedArray::D3(v) => v.iter().flatten().map(Vec::len).sum(),
    }
}
