use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use super::models::CourseRow;
use crate::domain::{CatalogCourse, CourseIdentity, Degree};
use crate::errors::ReviewResult;
use crate::ranking::FilterOptions;

const COURSE_COLUMNS: &str = "university, course, degree, region, area, campus, is_free, external_code";

pub fn upsert_course(conn: &Connection, course: &CatalogCourse) -> Result<()> {
    let sql = "INSERT INTO courses (course_key, university, course, degree, region, area, campus, is_free, external_code, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, CURRENT_TIMESTAMP) ON CONFLICT(course_key) DO UPDATE SET region = excluded.region, area = excluded.area, campus = excluded.campus, is_free = excluded.is_free, external_code = excluded.external_code, updated_at = CURRENT_TIMESTAMP";
    let identity = &course.identity;

    conn.execute(
        sql,
        params![
            identity.key(),
            identity.university(),
            identity.course(),
            identity.degree(),
            course.region,
            course.area,
            course.campus,
            course.is_free,
            course.external_code,
        ],
    )
    .with_context(|| format!("Failed to upsert catalog course {}", identity))?;

    Ok(())
}

fn parse_course_row(row: &rusqlite::Row) -> rusqlite::Result<CourseRow> {
    Ok(CourseRow {
        university: row.get(0)?,
        course: row.get(1)?,
        degree: row.get(2)?,
        region: row.get(3)?,
        area: row.get(4)?,
        campus: row.get(5)?,
        is_free: row.get(6)?,
        external_code: row.get(7)?,
    })
}

pub fn find_course(conn: &Connection, identity: &CourseIdentity) -> ReviewResult<Option<CatalogCourse>> {
    let sql = format!("SELECT {} FROM courses WHERE course_key = ?1", COURSE_COLUMNS);

    let row = conn
        .query_row(&sql, params![identity.key()], parse_course_row)
        .optional()
        .context("Failed to query catalog course")?;

    row.map(CourseRow::into_catalog_course).transpose()
}

/// Distinct regions, areas and degrees present in the catalog
pub fn list_filter_options(conn: &Connection) -> Result<FilterOptions> {
    let regions = distinct_values(conn, "region")?;
    let areas = distinct_values(conn, "area")?;

    let mut stmt = conn.prepare("SELECT DISTINCT degree FROM courses WHERE degree IS NOT NULL")?;
    let mut degrees = stmt
        .query_map([], |row| row.get::<_, Degree>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list catalog degrees")?;
    degrees.sort();

    Ok(FilterOptions { regions, areas, degrees })
}

fn distinct_values(conn: &Connection, column: &str) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT {0} FROM courses WHERE {0} IS NOT NULL AND {0} <> '' ORDER BY {0} COLLATE NOCASE",
        column
    );

    let mut stmt = conn.prepare(&sql)?;
    let values = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .with_context(|| format!("Failed to list catalog {} values", column))?;

    Ok(values)
}

pub fn count_all(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))
        .context("Failed to count catalog courses")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::setup::initialize_database;

    fn catalog_course(university: &str, course: &str, region: &str, is_free: bool) -> CatalogCourse {
        CatalogCourse {
            identity: CourseIdentity::new(university, course, Some(Degree::Bachelor)).unwrap(),
            region: Some(region.to_string()),
            area: Some("Engenharia".to_string()),
            campus: Some("São Paulo".to_string()),
            is_free,
            external_code: None,
        }
    }

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_upsert_then_find() {
        let conn = setup();
        let course = catalog_course("USP", "Engenharia Civil", "SP", true);
        upsert_course(&conn, &course).unwrap();

        let found = find_course(&conn, &course.identity).unwrap().unwrap();
        assert_eq!(found, course);
    }

    #[test]
    fn test_upsert_updates_metadata() {
        let conn = setup();
        upsert_course(&conn, &catalog_course("USP", "Engenharia Civil", "SP", true)).unwrap();
        let moved = catalog_course("USP", "Engenharia Civil", "RJ", false);
        upsert_course(&conn, &moved).unwrap();

        assert_eq!(count_all(&conn).unwrap(), 1);
        let found = find_course(&conn, &moved.identity).unwrap().unwrap();
        assert_eq!(found.region.as_deref(), Some("RJ"));
        assert!(!found.is_free);
    }

    #[test]
    fn test_find_unknown_course() {
        let conn = setup();
        let identity = CourseIdentity::new("USP", "Medicina", None).unwrap();
        assert!(find_course(&conn, &identity).unwrap().is_none());
    }

    #[test]
    fn test_filter_options_are_distinct() {
        let conn = setup();
        upsert_course(&conn, &catalog_course("USP", "Engenharia Civil", "SP", true)).unwrap();
        upsert_course(&conn, &catalog_course("UFRJ", "Engenharia Civil", "RJ", true)).unwrap();
        upsert_course(&conn, &catalog_course("UNICAMP", "Engenharia Civil", "SP", true)).unwrap();

        let options = list_filter_options(&conn).unwrap();
        assert_eq!(options.regions, vec!["RJ", "SP"]);
        assert_eq!(options.areas, vec!["Engenharia"]);
        assert_eq!(options.degrees, vec![Degree::Bachelor]);
    }
}
