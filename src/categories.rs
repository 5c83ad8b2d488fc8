use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::id::new_uuid_v7;
use crate::{AppError, AppResult};

const CATEGORY_NOT_FOUND_CODE: &str = "CATEGORY/NOT_FOUND";

/// One node of the user-defined hierarchy. Root categories have no parent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryInput {
    pub name: String,
    pub parent_id: Option<String>,
}

impl Category {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            parent_id: row.get("parent_id")?,
        })
    }
}

pub fn list_categories(db: &Database) -> AppResult<Vec<Category>> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, name, parent_id FROM categories ORDER BY name, id")
            .map_err(AppError::from)?;
        let result = stmt
            .query_map([], Category::from_row)
            .map_err(AppError::from)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "list")
                    .with_context("table", "categories")
            });
        result
    })
}

pub fn get_category(db: &Database, id: &str) -> AppResult<Option<Category>> {
    db.with_conn(|conn| {
        conn.query_row(
            "SELECT id, name, parent_id FROM categories WHERE id = ?1",
            [id],
            Category::from_row,
        )
        .optional()
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "get")
                .with_context("table", "categories")
                .with_context("id", id.to_string())
        })
    })
}

pub fn create_category(db: &Database, input: CategoryInput) -> AppResult<Category> {
    let category = Category {
        id: new_uuid_v7(),
        name: input.name,
        parent_id: input.parent_id,
    };
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO categories (id, name, parent_id) VALUES (?1, ?2, ?3)",
            (&category.id, &category.name, &category.parent_id),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "create")
                .with_context("table", "categories")
        })?;
        Ok(())
    })?;
    Ok(category)
}

pub fn update_category(db: &Database, id: &str, input: CategoryInput) -> AppResult<Category> {
    let changed = db.with_conn(|conn| {
        conn.execute(
            "UPDATE categories SET name = ?1, parent_id = ?2 WHERE id = ?3",
            (&input.name, &input.parent_id, id),
        )
        .map_err(|err| {
            AppError::from(err)
                .with_context("operation", "update")
                .with_context("table", "categories")
                .with_context("id", id.to_string())
        })
    })?;
    if changed == 0 {
        return Err(AppError::new(CATEGORY_NOT_FOUND_CODE, "Category not found")
            .with_context("id", id.to_string()));
    }
    Ok(Category {
        id: id.to_string(),
        name: input.name,
        parent_id: input.parent_id,
    })
}

pub fn delete_category(db: &Database, id: &str) -> AppResult<bool> {
    db.with_conn(|conn| {
        let deleted = conn
            .execute("DELETE FROM categories WHERE id = ?1", [id])
            .map_err(|err| {
                AppError::from(err)
                    .with_context("operation", "delete")
                    .with_context("table", "categories")
                    .with_context("id", id.to_string())
            })?;
        Ok(deleted > 0)
    })
}
