use crate::error::{AppError, AppResult};
use crate::model::{
    Admin, NewStudent, Outcome, PredictionStats, Student, StudentFeatures, Teacher,
    TeacherSummary,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

#[derive(Debug, FromRow)]
struct StudentRow {
    id: i64,
    teacher_id: i64,
    name: String,
    age: Option<i64>,
    previous_marks: Option<f64>,
    attendance_percent: Option<f64>,
    study_hours_per_week: Option<f64>,
    parental_education: Option<String>,
    family_income: Option<i64>,
    internet_access: Option<String>,
    extra_classes: Option<String>,
    assignment_score: Option<f64>,
    gender: Option<String>,
    prediction: Option<String>,
    probability: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for Student {
    type Error = AppError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        let outcome = match (row.prediction, row.probability) {
            (Some(label), Some(probability)) => Some(Outcome {
                prediction: label.parse().map_err(AppError::Corrupt)?,
                probability,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Corrupt(format!(
                    "student {} has a half-written prediction",
                    row.id
                )))
            }
        };

        Ok(Student {
            id: row.id,
            teacher_id: row.teacher_id,
            name: row.name,
            features: StudentFeatures {
                age: row.age,
                previous_marks: row.previous_marks,
                attendance_percent: row.attendance_percent,
                study_hours_per_week: row.study_hours_per_week,
                parental_education: row.parental_education,
                family_income: row.family_income,
                internet_access: row.internet_access,
                extra_classes: row.extra_classes,
                assignment_score: row.assignment_score,
                gender: row.gender,
            },
            outcome,
            created_at: row.created_at,
        })
    }
}

const STUDENT_COLUMNS: &str = "id, teacher_id, name, age, previous_marks, attendance_percent, \
     study_hours_per_week, parental_education, family_income, internet_access, extra_classes, \
     assignment_score, gender, prediction, probability, created_at";

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (and creates if missing) the database behind `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let mut pool_options =
            SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { max_connections });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Database { pool })
    }

    /// Fresh in-memory database with the schema already created.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let db = Self::connect("sqlite::memory:", 1).await?;
        db.init_schema().await?;
        Ok(db)
    }

    /// Creates tables, indexes and triggers. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teachers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                teacher_id INTEGER NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                age INTEGER,
                previous_marks REAL,
                attendance_percent REAL,
                study_hours_per_week REAL,
                parental_education TEXT,
                family_income INTEGER,
                internet_access TEXT,
                extra_classes TEXT,
                assignment_score REAL,
                gender TEXT,
                prediction TEXT CHECK (prediction IS NULL OR prediction IN ('Pass', 'Fail')),
                probability REAL CHECK (probability IS NULL OR (probability >= 0.0 AND probability <= 1.0)),
                created_at DATETIME NOT NULL,
                CHECK ((prediction IS NULL) = (probability IS NULL))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_students_teacher ON students(teacher_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS students_owner_immutable
            BEFORE UPDATE OF teacher_id ON students
            WHEN NEW.teacher_id <> OLD.teacher_id
            BEGIN
                SELECT RAISE(ABORT, 'student owner cannot change');
            END
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ---- teachers ----

    pub async fn create_teacher(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> AppResult<Teacher> {
        if self.find_teacher_by_email(email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered.".to_string()));
        }

        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO teachers (name, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| unique_to_conflict(e, "Email already registered."))?;

        Ok(Teacher {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    pub async fn find_teacher_by_email(&self, email: &str) -> AppResult<Option<Teacher>> {
        let teacher = sqlx::query_as::<_, Teacher>(
            "SELECT id, name, email, password_hash, created_at FROM teachers WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(teacher)
    }

    pub async fn get_teacher(&self, id: i64) -> AppResult<Option<Teacher>> {
        let teacher = sqlx::query_as::<_, Teacher>(
            "SELECT id, name, email, password_hash, created_at FROM teachers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(teacher)
    }

    /// All teachers, newest first, with how many students each owns.
    pub async fn list_teachers(&self) -> AppResult<Vec<TeacherSummary>> {
        let teachers = sqlx::query_as::<_, TeacherSummary>(
            r#"
            SELECT t.id, t.name, t.email, COUNT(s.id) AS student_count
            FROM teachers t
            LEFT JOIN students s ON s.teacher_id = t.id
            GROUP BY t.id, t.name, t.email
            ORDER BY t.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(teachers)
    }

    // ---- admins ----

    pub async fn create_admin(&self, username: &str, password_hash: &str) -> AppResult<Admin> {
        let result = sqlx::query("INSERT INTO admins (username, password_hash) VALUES (?, ?)")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| unique_to_conflict(e, "Admin already exists."))?;

        Ok(Admin {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        })
    }

    pub async fn find_admin_by_username(&self, username: &str) -> AppResult<Option<Admin>> {
        let admin = sqlx::query_as::<_, Admin>(
            "SELECT id, username, password_hash FROM admins WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(admin)
    }

    // ---- students ----

    pub async fn insert_student(&self, teacher_id: i64, student: &NewStudent) -> AppResult<Student> {
        let created_at = Utc::now();
        let f = &student.features;
        let result = sqlx::query(
            r#"
            INSERT INTO students (
                teacher_id, name, age, previous_marks, attendance_percent, study_hours_per_week,
                parental_education, family_income, internet_access, extra_classes,
                assignment_score, gender, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(teacher_id)
        .bind(&student.name)
        .bind(f.age)
        .bind(f.previous_marks)
        .bind(f.attendance_percent)
        .bind(f.study_hours_per_week)
        .bind(&f.parental_education)
        .bind(f.family_income)
        .bind(&f.internet_access)
        .bind(&f.extra_classes)
        .bind(f.assignment_score)
        .bind(&f.gender)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Student {
            id: result.last_insert_rowid(),
            teacher_id,
            name: student.name.clone(),
            features: student.features.clone(),
            outcome: None,
            created_at,
        })
    }

    pub async fn get_student(&self, id: i64) -> AppResult<Option<Student>> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Student::try_from).transpose()
    }

    /// Loads a student on behalf of a teacher. Unknown ids are `NotFound`,
    /// students of other teachers are `Forbidden`.
    pub async fn student_for_teacher(&self, id: i64, teacher_id: i64) -> AppResult<Student> {
        let student = self.get_student(id).await?.ok_or(AppError::NotFound)?;
        if student.teacher_id != teacher_id {
            tracing::warn!(
                student_id = id,
                teacher_id,
                owner_id = student.teacher_id,
                "rejected access to another teacher's student"
            );
            return Err(AppError::Forbidden);
        }
        Ok(student)
    }

    /// A teacher's students, newest first.
    pub async fn students_for_teacher(&self, teacher_id: i64) -> AppResult<Vec<Student>> {
        let rows = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE teacher_id = ? ORDER BY id DESC"
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Student::try_from).collect()
    }

    /// Writes name and features back. The prediction columns and the owner
    /// are left untouched.
    pub async fn update_student(&self, student: &Student) -> AppResult<()> {
        let f = &student.features;
        let result = sqlx::query(
            r#"
            UPDATE students SET
                name = ?, age = ?, previous_marks = ?, attendance_percent = ?,
                study_hours_per_week = ?, parental_education = ?, family_income = ?,
                internet_access = ?, extra_classes = ?, assignment_score = ?, gender = ?
            WHERE id = ? AND teacher_id = ?
            "#,
        )
        .bind(&student.name)
        .bind(f.age)
        .bind(f.previous_marks)
        .bind(f.attendance_percent)
        .bind(f.study_hours_per_week)
        .bind(&f.parental_education)
        .bind(f.family_income)
        .bind(&f.internet_access)
        .bind(&f.extra_classes)
        .bind(f.assignment_score)
        .bind(&f.gender)
        .bind(student.id)
        .bind(student.teacher_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn delete_student(&self, id: i64, teacher_id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM students WHERE id = ? AND teacher_id = ?")
            .bind(id)
            .bind(teacher_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    /// Stores label and probability together in one statement.
    pub async fn save_outcome(&self, id: i64, teacher_id: i64, outcome: Outcome) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE students SET prediction = ?, probability = ? WHERE id = ? AND teacher_id = ?",
        )
        .bind(outcome.prediction.as_str())
        .bind(outcome.probability.clamp(0.0, 1.0))
        .bind(id)
        .bind(teacher_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub async fn prediction_stats(&self, teacher_id: i64) -> AppResult<PredictionStats> {
        let (total, passes, fails, avg_prob_pass, avg_prob_fail): (
            i64,
            Option<i64>,
            Option<i64>,
            Option<f64>,
            Option<f64>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                SUM(CASE WHEN prediction = 'Pass' THEN 1 ELSE 0 END),
                SUM(CASE WHEN prediction = 'Fail' THEN 1 ELSE 0 END),
                AVG(CASE WHEN prediction = 'Pass' THEN probability END),
                AVG(CASE WHEN prediction = 'Fail' THEN probability END)
            FROM students
            WHERE teacher_id = ?
            "#,
        )
        .bind(teacher_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(PredictionStats {
            total,
            passes: passes.unwrap_or(0),
            fails: fails.unwrap_or(0),
            avg_prob_pass: avg_prob_pass.unwrap_or(0.0),
            avg_prob_fail: avg_prob_fail.unwrap_or(0.0),
        })
    }
}

fn unique_to_conflict(err: sqlx::Error, message: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict(message.to_string())
        }
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Label;

    async fn seeded() -> (Database, i64, i64) {
        let db = Database::in_memory().await.unwrap();
        let teacher = db.create_teacher("Ada", "ada@school.org", "hash").await.unwrap();
        let student = db
            .insert_student(
                teacher.id,
                &NewStudent {
                    name: "Amina".into(),
                    features: StudentFeatures::default(),
                },
            )
            .await
            .unwrap();
        (db, teacher.id, student.id)
    }

    #[tokio::test]
    async fn schema_can_be_created_twice() {
        let (db, _, _) = seeded().await;
        db.init_schema().await.unwrap();
        assert!(db.get_teacher(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let (db, _, _) = seeded().await;
        let err = db.create_teacher("Other", "ada@school.org", "hash").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg == "Email already registered."));
    }

    #[tokio::test]
    async fn stats_are_zero_without_predictions() {
        let (db, teacher_id, _) = seeded().await;
        let stats = db.prediction_stats(teacher_id).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!((stats.passes, stats.fails), (0, 0));
        assert_eq!(stats.avg_prob_pass, 0.0);
    }

    #[tokio::test]
    async fn outcome_is_written_as_a_pair() {
        let (db, teacher_id, id) = seeded().await;
        db.save_outcome(
            id,
            teacher_id,
            Outcome {
                prediction: Label::Fail,
                probability: 0.8,
            },
        )
        .await
        .unwrap();

        let student = db.get_student(id).await.unwrap().unwrap();
        assert_eq!(student.outcome.map(|o| o.prediction), Some(Label::Fail));

        let half = sqlx::query("UPDATE students SET probability = NULL WHERE id = ?")
            .bind(id)
            .execute(&db.pool)
            .await;
        assert!(half.is_err());
    }

    #[tokio::test]
    async fn owner_cannot_be_reassigned() {
        let (db, _, id) = seeded().await;
        let other = db.create_teacher("Eve", "eve@school.org", "hash").await.unwrap();
        let moved = sqlx::query("UPDATE students SET teacher_id = ? WHERE id = ?")
            .bind(other.id)
            .bind(id)
            .execute(&db.pool)
            .await;
        assert!(moved.is_err());
        assert_eq!(
            db.student_for_teacher(id, other.id).await.unwrap_err().error_code(),
            "FORBIDDEN"
        );
    }
}
