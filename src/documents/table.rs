/// Flattens CSV bytes into an aligned text table: a header row followed by
/// one row per record, each prefixed with its zero-based row number. Columns
/// are right-aligned to their widest cell.
pub fn render_csv(bytes: &[u8]) -> Result<String, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let columns = rows.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
    let index_width = rows.len().saturating_sub(1).to_string().len();

    let mut widths = vec![0usize; columns];
    for row in std::iter::once(&headers).chain(rows.iter()) {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render_row = |label: &str, cells: &[String]| {
        let mut line = format!("{label:<index_width$}");
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            line.push_str(&format!("  {cell:>width$}"));
        }
        line
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render_row("", &headers));
    for (i, row) in rows.iter().enumerate() {
        lines.push(render_row(&i.to_string(), row));
    }
    Ok(lines.join("\n"))
}
