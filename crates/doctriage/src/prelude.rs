pub use crate::error::Error;

pub use anstream::eprintln;
pub use anstream::println;
pub use color_eyre::eyre::{eyre, Result};
pub use std::format as f;

/// Borderless table with a rule under the title row.
pub fn new_table() -> prettytable::Table {
    use prettytable::format::{FormatBuilder, LinePosition, LineSeparator};

    let mut table = prettytable::Table::new();

    let format = FormatBuilder::new()
        .padding(1, 1)
        .separator(LinePosition::Title, LineSeparator::new('-', '+', '+', '+'))
        .build();

    table.set_format(format);

    table
}
