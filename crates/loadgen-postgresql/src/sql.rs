//! SQL statements for the workload table.

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate CREATE TABLE IF NOT EXISTS for the workload table.
pub fn generate_create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (worker_id INT, iteration INT, value DECIMAL, \"timestamp\" TIMESTAMP)",
        quote_ident(table)
    )
}

/// Generate the parameterized single-row INSERT used by Writes.
pub fn generate_insert(table: &str) -> String {
    format!(
        "INSERT INTO {} (worker_id, iteration, value, \"timestamp\") VALUES ($1, $2, $3, $4)",
        quote_ident(table)
    )
}

/// Generate the Read aggregate: the worker with the most rows and its value
/// statistics. Ties go to the lowest worker id.
pub fn generate_top_worker(table: &str) -> String {
    format!(
        "SELECT worker_id, COUNT(*), AVG(value)::float8, MAX(value)::float8, MIN(value)::float8 \
         FROM {} GROUP BY worker_id ORDER BY COUNT(*) DESC, worker_id ASC LIMIT 1",
        quote_ident(table)
    )
}

/// Generate DROP TABLE statement.
pub fn generate_drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table))
}
