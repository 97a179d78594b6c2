use std::io::{self, Write};

const TRUNCATION_MARKER: &str = "...";
const SIZE_SCALES: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "EB"];
const SIZE_BASE: usize = 1024;

/// Flattens newlines to `|` and shortens `text` to at most `max` characters,
/// ending in `...` when anything was cut.
pub fn truncate(text: &str, max: usize) -> String {
    let flat = text.replace('\n', "|");
    if flat.chars().count() <= max {
        return flat;
    }

    let keep = max.saturating_sub(TRUNCATION_MARKER.len());
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str(&TRUNCATION_MARKER[..max.min(TRUNCATION_MARKER.len())]);
    out
}

/// Human readable byte count using powers of 1024.
pub fn pp(bytes: usize) -> String {
    if bytes <= SIZE_BASE {
        return format!("{bytes:4}     {}", SIZE_SCALES[0]);
    }

    let mut value = bytes as f64;
    let mut degree = 0;
    while value > SIZE_BASE as f64 && degree < SIZE_SCALES.len() - 1 {
        value /= SIZE_BASE as f64;
        degree += 1;
    }
    format!("{value:7.2} {}", SIZE_SCALES[degree])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub width: usize,
    pub align: Align,
    pub max_len: Option<usize>,
}

impl Column {
    pub const fn left(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            align: Align::Left,
            max_len: None,
        }
    }

    pub const fn right(name: &'static str, width: usize) -> Self {
        Self {
            name,
            width,
            align: Align::Right,
            max_len: None,
        }
    }

    pub const fn truncated(self, max_len: usize) -> Self {
        Self {
            max_len: Some(max_len),
            ..self
        }
    }

    pub fn cell(&self, text: &str) -> String {
        let text = match self.max_len {
            Some(max) => truncate(text, max),
            None => text.to_string(),
        };
        match self.align {
            Align::Left => format!("{text:<width$}", width = self.width),
            Align::Right => format!("{text:>width$}", width = self.width),
        }
    }
}

/// Fixed-width text table. Every line is built in full before it is written.
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    columns: &'a [Column],
}

impl<'a> Table<'a> {
    pub const fn new(columns: &'a [Column]) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        self.columns
    }

    pub fn header(&self) -> String {
        let cells: Vec<String> = self
            .columns
            .iter()
            .map(|col| match col.align {
                Align::Left => format!("{:<width$}", col.name, width = col.width),
                Align::Right => format!("{:>width$}", col.name, width = col.width),
            })
            .collect();
        format!("{}\n", cells.join(" "))
    }

    /// Formats one row; missing cells render empty, extra cells are ignored.
    pub fn row<S: AsRef<str>>(&self, cells: &[S]) -> String {
        let cells: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, col)| col.cell(cells.get(i).map(|c| c.as_ref()).unwrap_or("")))
            .collect();
        format!("{}\n", cells.join(" "))
    }

    pub fn write_header<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(self.header().as_bytes())
    }

    pub fn write_row<W: Write + ?Sized, S: AsRef<str>>(
        &self,
        out: &mut W,
        cells: &[S],
    ) -> io::Result<()> {
        out.write_all(self.row(cells).as_bytes())
    }
}
