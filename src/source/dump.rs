//! Human-readable packet dumps for debugging

use std::io::Write;

use super::{DataSource, FieldAccessor};
use crate::types::{Data, Packet};

impl DataSource {
    /// Writes every field of every record in `packet` to `out`, one per line.
    ///
    /// Each line shows the field's full name, size, tags and raw bytes.
    /// Fields whose bytes lie outside the record's slot are reported as
    /// `! invalid size` instead of failing the dump.
    pub fn dump(&self, packet: &Packet, out: &mut impl Write) -> std::io::Result<()> {
        let accessors: Vec<FieldAccessor> = self
            .accessors(false)
            .into_iter()
            .filter(|a| !a.field().is_empty())
            .collect();

        for (i, data) in packet.records().iter().enumerate() {
            if packet.as_array().is_some() {
                writeln!(out, "[{i}]")?;
            }
            dump_data(&accessors, data, out)?;
        }
        Ok(())
    }
}

fn dump_data(accessors: &[FieldAccessor], data: &Data, out: &mut impl Write) -> std::io::Result<()> {
    for acc in accessors {
        let field = acc.field();
        match acc.get_bytes(data) {
            Ok(bytes) => writeln!(
                out,
                "{} ({}) [{}]: {:?}",
                field.full_name,
                field.size,
                field.tags.join(" "),
                bytes
            )?,
            Err(_) => writeln!(out, "{} ({}): ! invalid size", field.full_name, field.size)?,
        }
    }
    Ok(())
}
