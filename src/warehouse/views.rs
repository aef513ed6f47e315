// src/warehouse/views.rs
//! Fixed SQL that builds the trusted and refined tables over the raw tables.

const TRUSTED_SQL: &str = include_str!("sql/create_trusted_tables.sql");
const REFINED_SQL: &str = include_str!("sql/create_refined_table.sql");

/// One named statement, ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub name: &'static str,
    pub sql: String,
}

fn render(template: &str, project: &str, dataset: &str) -> String {
    template
        .replace("{{project}}", project)
        .replace("{{dataset}}", dataset)
}

/// Trusted first, then refined; the refined table reads the trusted ones.
pub fn materialization_sql(project: &str, dataset: &str) -> Vec<Statement> {
    vec![
        Statement {
            name: "trusted",
            sql: render(TRUSTED_SQL, project, dataset),
        },
        Statement {
            name: "refined",
            sql: render(REFINED_SQL, project, dataset),
        },
    ]
}
