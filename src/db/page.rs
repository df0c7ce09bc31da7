//! SQL rendering of a [`PageQuery`].

use sqlx::{QueryBuilder, Sqlite};

use crate::pagination::{IdBound, PageQuery, SortKey};

/// Append the id bound, ordering and limit/offset of `query`.
///
/// The builder must already end in a `WHERE` clause; the bound is joined with `AND`.
/// Column names are trusted identifiers, never user input.
pub(crate) fn push_page_clauses(
    qb: &mut QueryBuilder<'_, Sqlite>,
    query: &PageQuery,
    id_column: &'static str,
    created_column: &'static str,
) {
    match query.id_bound {
        Some(IdBound::After(id)) => {
            qb.push(format!(" AND {} > ", id_column)).push_bind(id);
        }
        Some(IdBound::Before(id)) => {
            qb.push(format!(" AND {} < ", id_column)).push_bind(id);
        }
        None => {}
    }

    let direction = query.order.as_str();
    match query.sort {
        SortKey::Id => {
            qb.push(format!(" ORDER BY {} {}", id_column, direction));
        }
        SortKey::CreatedAtThenId => {
            qb.push(format!(
                " ORDER BY {} {}, {} {}",
                created_column, direction, id_column, direction
            ));
        }
    }

    qb.push(" LIMIT ")
        .push_bind(sql_int(query.limit))
        .push(" OFFSET ")
        .push_bind(sql_int(query.offset));
}

/// SQLite integers are signed; a larger value saturates instead of wrapping negative.
fn sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Order;

    #[test]
    fn test_cursor_clauses() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM posts p WHERE 1 = 1");
        let query = PageQuery {
            id_bound: Some(IdBound::Before(9)),
            sort: SortKey::Id,
            order: Order::Desc,
            offset: 0,
            limit: 21,
        };

        push_page_clauses(&mut qb, &query, "p.id", "p.created_at");

        assert_eq!(
            qb.sql(),
            "SELECT id FROM posts p WHERE 1 = 1 AND p.id < ? ORDER BY p.id DESC LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn test_huge_values_saturate() {
        assert_eq!(sql_int(40), 40);
        assert_eq!(sql_int(u64::from(u32::MAX) * u64::from(u32::MAX)), i64::MAX);
        assert_eq!(sql_int(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_offset_clauses() {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM posts p WHERE 1 = 1");
        let query = PageQuery {
            id_bound: None,
            sort: SortKey::CreatedAtThenId,
            order: Order::Asc,
            offset: 40,
            limit: 20,
        };

        push_page_clauses(&mut qb, &query, "p.id", "p.created_at");

        assert_eq!(
            qb.sql(),
            "SELECT id FROM posts p WHERE 1 = 1 ORDER BY p.created_at ASC, p.id ASC LIMIT ? OFFSET ?"
        );
    }
}
