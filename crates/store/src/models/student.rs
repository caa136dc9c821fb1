use crate::error::Error;
use crate::models::{id_from_row, id_to_row};
use crate::record::{SqliteQuery, Student};

#[derive(sqlx::FromRow)]
pub struct StudentRow {
    pub(crate) id: Option<i64>,
    pub(crate) registration_number: String,
    pub(crate) name: String,
    pub(crate) class_name: String,
}
impl StudentRow {
    pub(crate) fn upsert(self) -> SqliteQuery {
        sqlx::query(include_str!("../../queries/upsert_student.sql"))
            .bind(self.id)
            .bind(self.registration_number)
            .bind(self.name)
            .bind(self.class_name)
    }

    pub(crate) fn insert(self) -> SqliteQuery {
        sqlx::query(include_str!("../../queries/insert_student.sql"))
            .bind(self.id)
            .bind(self.registration_number)
            .bind(self.name)
            .bind(self.class_name)
    }
}
impl TryFrom<&Student> for StudentRow {
    type Error = Error;
    fn try_from(student: &Student) -> Result<Self, Self::Error> {
        Ok(Self {
            id: student.id.map(|id| id_to_row(id, "student id")).transpose()?,
            registration_number: student.registration_number.clone(),
            name: student.name.clone(),
            class_name: student.class_name.clone(),
        })
    }
}
impl TryFrom<StudentRow> for Student {
    type Error = Error;
    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(id_from_row(row.id, "student id")?),
            name: row.name,
            registration_number: row.registration_number,
            class_name: row.class_name,
        })
    }
}
