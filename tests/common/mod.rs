//! Shared helpers for the integration test suite.

#![allow(dead_code)]

use std::path::PathBuf;

use rowtrace_core::prelude::*;
use rowtrace_core::value::DataType;

pub fn int_col(name: &str, values: &[i64]) -> Column {
    Column::new(
        name,
        DataType::Int,
        false,
        values.iter().map(|&v| Value::Int(v)).collect(),
    )
}

pub fn int_col_opt(name: &str, values: &[Option<i64>]) -> Column {
    Column::new(
        name,
        DataType::Int,
        true,
        values
            .iter()
            .map(|v| v.map(Value::Int).unwrap_or(Value::Null))
            .collect(),
    )
}

pub fn float_col(name: &str, values: &[f64]) -> Column {
    Column::new(
        name,
        DataType::Float,
        false,
        values.iter().map(|&v| Value::Float(v)).collect(),
    )
}

pub fn text_col(name: &str, values: &[&str]) -> Column {
    Column::new(
        name,
        DataType::Text,
        false,
        values.iter().map(|&v| Value::Text(v.to_string())).collect(),
    )
}

pub fn bool_col(name: &str, values: &[bool]) -> Column {
    Column::new(
        name,
        DataType::Bool,
        false,
        values.iter().map(|&v| Value::Bool(v)).collect(),
    )
}

pub fn table(columns: Vec<Column>) -> Table {
    Table::try_new(columns).expect("test table is well-formed")
}

/// Fresh scratch directory unique to one test.
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rowtrace-{}-{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn int_values(table: &Table, column: &str) -> Vec<i64> {
    table
        .column(column)
        .expect("column exists")
        .values
        .iter()
        .map(|v| match v {
            Value::Int(i) => *i,
            other => panic!("expected int, found {other:?}"),
        })
        .collect()
}

pub fn text_values(table: &Table, column: &str) -> Vec<String> {
    table
        .column(column)
        .expect("column exists")
        .values
        .iter()
        .map(|v| match v {
            Value::Text(s) => s.clone(),
            other => panic!("expected text, found {other:?}"),
        })
        .collect()
}
