use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, ToSql, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::schema::SCHEMA;
use super::{PaymentFilter, Store};
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|e| {
        tracing::error!("Invalid date in database: '{}' - {}", s, e);
        NaiveDate::default()
    })
}

fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or_else(|| {
        tracing::error!("Invalid role in database: '{}'", s);
        Role::Student
    })
}

/// Amounts are fixed-point with two decimals; stored as integer cents.
fn to_cents(amount: Decimal) -> i64 {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .unwrap_or_else(|| {
            tracing::error!("Amount out of range: {}", amount);
            0
        })
}

fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

fn account_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        role: parse_role(&row.get::<_, String>(3)?),
        is_active: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

fn payment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: row.get(0)?,
        transaction_date: parse_date(&row.get::<_, String>(1)?),
        description: row.get(2)?,
        amount: from_cents(row.get(3)?),
        reference_no: row.get(4)?,
        payment_type: row.get(5)?,
        student_id: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
        is_active: row.get(9)?,
    })
}

fn allocation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Allocation> {
    Ok(Allocation {
        id: row.get(0)?,
        enrollment_id: row.get(1)?,
        payment_id: row.get(2)?,
        amount: from_cents(row.get(3)?),
        payment_date: parse_date(&row.get::<_, String>(4)?),
        method: row.get(5)?,
        notes: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

fn enrollment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Enrollment> {
    Ok(Enrollment {
        id: row.get(0)?,
        course_id: row.get(1)?,
        student_id: row.get(2)?,
        enrolled_by: row.get(3)?,
        enrolled_at: parse_datetime(&row.get::<_, String>(4)?),
        is_active: row.get(5)?,
    })
}

fn course_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        id: row.get(0)?,
        name: row.get(1)?,
        instructor_name: row.get(2)?,
        price: from_cents(row.get(3)?),
        description: row.get(4)?,
        is_active: row.get(5)?,
        is_deleted: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

const PAYMENT_COLS: &str = "id, transaction_date, description, amount_cents, reference_no, \
     payment_type, student_id, created_by, created_at, is_active";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Server metadata

    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row(
                "SELECT value FROM app_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::from)
    }

    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO app_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    // Account operations

    fn create_account(&self, account: &Account) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO accounts (id, email, password_hash, role, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                account.id,
                account.email,
                account.password_hash,
                account.role.as_str(),
                account.is_active,
                format_datetime(&account.created_at),
                format_datetime(&account.updated_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("accounts.email") =>
            {
                Err(Error::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_account(&self, id: &str) -> Result<Option<Account>> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, is_active, created_at, updated_at
                 FROM accounts WHERE id = ?1",
                params![id],
                account_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.conn()
            .query_row(
                "SELECT id, email, password_hash, role, is_active, created_at, updated_at
                 FROM accounts WHERE email = ?1",
                params![email],
                account_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_students(
        &self,
        search: Option<&str>,
        active: Option<bool>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Account>> {
        let mut sql = String::from(
            "SELECT DISTINCT a.id, a.email, a.password_hash, a.role, a.is_active, a.created_at, a.updated_at
             FROM accounts a
             LEFT JOIN student_profiles p ON p.account_id = a.id
             WHERE a.role = 'student' AND a.id > ?1",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(cursor.to_string())];

        if let Some(term) = search {
            let pattern = format!("%{term}%");
            sql.push_str(
                " AND (a.email LIKE ?2 OR p.first_name LIKE ?2 OR p.last_name LIKE ?2 OR p.phone LIKE ?2)",
            );
            args.push(Box::new(pattern));
        }
        if let Some(active) = active {
            sql.push_str(&format!(" AND a.is_active = ?{}", args.len() + 1));
            args.push(Box::new(active));
        }
        sql.push_str(&format!(" ORDER BY a.id LIMIT ?{}", args.len() + 1));
        args.push(Box::new(limit));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), account_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_account(&self, account: &Account) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE accounts SET email = ?1, password_hash = ?2, is_active = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                account.email,
                account.password_hash,
                account.is_active,
                format_datetime(&Utc::now()),
                account.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_account(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn has_admin_account(&self) -> Result<bool> {
        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM accounts WHERE role = 'admin' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    // Student profile operations

    fn upsert_student_profile(&self, profile: &StudentProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO student_profiles (account_id, first_name, last_name, phone, address, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account_id) DO UPDATE SET
                 first_name = excluded.first_name,
                 last_name = excluded.last_name,
                 phone = excluded.phone,
                 address = excluded.address,
                 updated_at = excluded.updated_at",
            params![
                profile.account_id,
                profile.first_name,
                profile.last_name,
                profile.phone,
                profile.address,
                format_datetime(&profile.created_at),
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn get_student_profile(&self, account_id: &str) -> Result<Option<StudentProfile>> {
        self.conn()
            .query_row(
                "SELECT account_id, first_name, last_name, phone, address, created_at, updated_at
                 FROM student_profiles WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(StudentProfile {
                        account_id: row.get(0)?,
                        first_name: row.get(1)?,
                        last_name: row.get(2)?,
                        phone: row.get(3)?,
                        address: row.get(4)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                        updated_at: parse_datetime(&row.get::<_, String>(6)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    // Token operations

    fn create_token(&self, token: &Token) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO tokens (id, token_hash, token_lookup, account_id, created_at, expires_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.token_hash,
                token.token_lookup,
                token.account_id,
                format_datetime(&token.created_at),
                token.expires_at.as_ref().map(format_datetime),
                token.last_used_at.as_ref().map(format_datetime),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("token_lookup") =>
            {
                Err(Error::TokenLookupCollision)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>> {
        self.conn()
            .query_row(
                "SELECT id, token_hash, token_lookup, account_id, created_at, expires_at, last_used_at
                 FROM tokens WHERE token_lookup = ?1",
                params![lookup],
                |row| {
                    Ok(Token {
                        id: row.get(0)?,
                        token_hash: row.get(1)?,
                        token_lookup: row.get(2)?,
                        account_id: row.get(3)?,
                        created_at: parse_datetime(&row.get::<_, String>(4)?),
                        expires_at: row.get::<_, Option<String>>(5)?.map(|s| parse_datetime(&s)),
                        last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn delete_token(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tokens WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn update_token_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Course operations

    fn create_course(&self, course: &Course) -> Result<()> {
        self.conn().execute(
            "INSERT INTO courses (id, name, instructor_name, price_cents, description, is_active, is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                course.id,
                course.name,
                course.instructor_name,
                to_cents(course.price),
                course.description,
                course.is_active,
                course.is_deleted,
                format_datetime(&course.created_at),
                format_datetime(&course.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get_course(&self, id: &str) -> Result<Option<Course>> {
        self.conn()
            .query_row(
                "SELECT id, name, instructor_name, price_cents, description, is_active, is_deleted, created_at, updated_at
                 FROM courses WHERE id = ?1 AND is_deleted = 0",
                params![id],
                course_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_courses(&self) -> Result<Vec<Course>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, instructor_name, price_cents, description, is_active, is_deleted, created_at, updated_at
             FROM courses WHERE is_deleted = 0 ORDER BY created_at DESC, id",
        )?;
        let rows = stmt.query_map([], course_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_course(&self, course: &Course) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE courses SET name = ?1, instructor_name = ?2, price_cents = ?3,
                 description = ?4, is_active = ?5, updated_at = ?6
             WHERE id = ?7 AND is_deleted = 0",
            params![
                course.name,
                course.instructor_name,
                to_cents(course.price),
                course.description,
                course.is_active,
                format_datetime(&Utc::now()),
                course.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_course(&self, id: &str) -> Result<bool> {
        // Schedules, enrollments, and their allocations go with it (FK cascade).
        let rows = self
            .conn()
            .execute("DELETE FROM courses WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn replace_course_schedules(&self, course_id: &str, slots: &[ScheduleSlot]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM course_schedules WHERE course_id = ?1",
            params![course_id],
        )?;
        for slot in slots {
            tx.execute(
                "INSERT INTO course_schedules (id, course_id, day_of_week, start_time, end_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    slot.id,
                    course_id,
                    slot.day_of_week,
                    slot.start_time,
                    slot.end_time,
                    format_datetime(&slot.created_at),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn list_course_schedules(&self, course_id: &str) -> Result<Vec<ScheduleSlot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, course_id, day_of_week, start_time, end_time, created_at
             FROM course_schedules WHERE course_id = ?1 ORDER BY start_time",
        )?;
        let rows = stmt.query_map(params![course_id], |row| {
            Ok(ScheduleSlot {
                id: row.get(0)?,
                course_id: row.get(1)?,
                day_of_week: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Enrollment operations

    fn create_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        self.conn().execute(
            "INSERT INTO enrollments (id, course_id, student_id, enrolled_by, enrolled_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                enrollment.id,
                enrollment.course_id,
                enrollment.student_id,
                enrollment.enrolled_by,
                format_datetime(&enrollment.enrolled_at),
                enrollment.is_active,
            ],
        )?;
        Ok(())
    }

    fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>> {
        self.conn()
            .query_row(
                "SELECT id, course_id, student_id, enrolled_by, enrolled_at, is_active
                 FROM enrollments WHERE id = ?1",
                params![id],
                enrollment_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_active_enrollment(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<Option<Enrollment>> {
        self.conn()
            .query_row(
                "SELECT id, course_id, student_id, enrolled_by, enrolled_at, is_active
                 FROM enrollments WHERE course_id = ?1 AND student_id = ?2 AND is_active = 1",
                params![course_id, student_id],
                enrollment_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_course_enrollments(
        &self,
        course_id: &str,
        active_only: bool,
    ) -> Result<Vec<Enrollment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, course_id, student_id, enrolled_by, enrolled_at, is_active
             FROM enrollments WHERE course_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY enrolled_at, id",
        )?;
        let rows = stmt.query_map(params![course_id, active_only], enrollment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_student_enrollments(
        &self,
        student_id: &str,
        active_only: bool,
    ) -> Result<Vec<Enrollment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, course_id, student_id, enrolled_by, enrolled_at, is_active
             FROM enrollments WHERE student_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY enrolled_at, id",
        )?;
        let rows = stmt.query_map(params![student_id, active_only], enrollment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn deactivate_enrollment(&self, id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM allocations WHERE enrollment_id = ?1",
            params![id],
        )?;
        let rows = tx.execute(
            "UPDATE enrollments SET is_active = 0 WHERE id = ?1",
            params![id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound);
        }

        tx.commit()?;
        Ok(())
    }

    // Ledger payment operations

    fn create_payment(&self, payment: &Payment) -> Result<()> {
        self.conn().execute(
            &format!(
                "INSERT INTO payments ({PAYMENT_COLS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                payment.id,
                format_date(&payment.transaction_date),
                payment.description,
                to_cents(payment.amount),
                payment.reference_no,
                payment.payment_type,
                payment.student_id,
                payment.created_by,
                format_datetime(&payment.created_at),
                payment.is_active,
            ],
        )?;
        Ok(())
    }

    fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        self.conn()
            .query_row(
                &format!("SELECT {PAYMENT_COLS} FROM payments WHERE id = ?1"),
                params![id],
                payment_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>> {
        let mut sql = format!("SELECT {PAYMENT_COLS} FROM payments WHERE is_active = 1 AND id > ?1");
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(filter.cursor.clone())];

        if let Some(term) = &filter.search {
            // A numeric search term also matches the exact amount.
            if let Ok(amount) = term.trim().parse::<Decimal>() {
                sql.push_str(&format!(
                    " AND (description LIKE ?{} OR amount_cents = ?{})",
                    args.len() + 1,
                    args.len() + 2
                ));
                args.push(Box::new(format!("%{term}%")));
                args.push(Box::new(to_cents(amount)));
            } else {
                sql.push_str(&format!(" AND description LIKE ?{}", args.len() + 1));
                args.push(Box::new(format!("%{term}%")));
            }
        }
        if let Some(since) = &filter.since {
            sql.push_str(&format!(" AND transaction_date >= ?{}", args.len() + 1));
            args.push(Box::new(format_date(since)));
        }
        if let Some(on) = &filter.on {
            sql.push_str(&format!(" AND transaction_date = ?{}", args.len() + 1));
            args.push(Box::new(format_date(on)));
        }
        sql.push_str(&format!(" ORDER BY id LIMIT ?{}", args.len() + 1));
        args.push(Box::new(filter.limit));

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), payment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn payment_exists(&self, date: NaiveDate, description: &str, amount: Decimal) -> Result<bool> {
        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM payments
                 WHERE transaction_date = ?1 AND description = ?2 AND amount_cents = ?3
                 LIMIT 1",
                params![format_date(&date), description, to_cents(amount)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn insert_payments(&self, payments: &[Payment]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut inserted = 0;
        for payment in payments {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM payments
                     WHERE transaction_date = ?1 AND description = ?2 AND amount_cents = ?3
                     LIMIT 1",
                    params![
                        format_date(&payment.transaction_date),
                        payment.description,
                        to_cents(payment.amount),
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                continue;
            }

            tx.execute(
                &format!(
                    "INSERT INTO payments ({PAYMENT_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    payment.id,
                    format_date(&payment.transaction_date),
                    payment.description,
                    to_cents(payment.amount),
                    payment.reference_no,
                    payment.payment_type,
                    payment.student_id,
                    payment.created_by,
                    format_datetime(&payment.created_at),
                    payment.is_active,
                ],
            )?;
            inserted += 1;
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn delete_payments(&self, ids: &[String]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let mut deleted = 0;
        for id in ids {
            tx.execute("DELETE FROM allocations WHERE payment_id = ?1", params![id])?;
            deleted += tx.execute(
                "DELETE FROM payments WHERE id = ?1 AND is_active = 1",
                params![id],
            )?;
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn list_unassigned_payments(&self) -> Result<Vec<Payment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLS} FROM payments
             WHERE is_active = 1
               AND id NOT IN (SELECT payment_id FROM allocations WHERE payment_id IS NOT NULL)
             ORDER BY transaction_date DESC, id"
        ))?;
        let rows = stmt.query_map([], payment_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // Allocation operations

    fn create_allocation(&self, allocation: &Allocation) -> Result<()> {
        let result = self.conn().execute(
            "INSERT INTO allocations (id, enrollment_id, payment_id, amount_cents, payment_date, method, notes, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                allocation.id,
                allocation.enrollment_id,
                allocation.payment_id,
                to_cents(allocation.amount),
                format_date(&allocation.payment_date),
                allocation.method,
                allocation.notes,
                allocation.created_by,
                format_datetime(&allocation.created_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
                    && msg.contains("idx_allocations_payment") =>
            {
                Err(Error::PaymentAlreadyAllocated)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_allocation(&self, id: &str) -> Result<Option<Allocation>> {
        self.conn()
            .query_row(
                "SELECT id, enrollment_id, payment_id, amount_cents, payment_date, method, notes, created_by, created_at
                 FROM allocations WHERE id = ?1",
                params![id],
                allocation_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn payment_is_allocated(&self, payment_id: &str) -> Result<bool> {
        let exists: Option<i64> = self
            .conn()
            .query_row(
                "SELECT 1 FROM allocations WHERE payment_id = ?1 LIMIT 1",
                params![payment_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn list_enrollment_allocations(&self, enrollment_id: &str) -> Result<Vec<Allocation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, enrollment_id, payment_id, amount_cents, payment_date, method, notes, created_by, created_at
             FROM allocations WHERE enrollment_id = ?1 ORDER BY payment_date, id",
        )?;
        let rows = stmt.query_map(params![enrollment_id], allocation_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn sum_enrollment_allocations(&self, enrollment_id: &str) -> Result<Decimal> {
        let cents: i64 = self.conn().query_row(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM allocations WHERE enrollment_id = ?1",
            params![enrollment_id],
            |row| row.get(0),
        )?;
        Ok(from_cents(cents))
    }

    fn delete_allocation(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM allocations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Announcement operations

    fn create_announcement(&self, announcement: &Announcement) -> Result<()> {
        self.conn().execute(
            "INSERT INTO announcements (id, course_id, title, content, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                announcement.id,
                announcement.course_id,
                announcement.title,
                announcement.content,
                announcement.created_by,
                format_datetime(&announcement.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_announcement(&self, id: &str) -> Result<Option<Announcement>> {
        self.conn()
            .query_row(
                "SELECT id, course_id, title, content, created_by, created_at
                 FROM announcements WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Announcement {
                        id: row.get(0)?,
                        course_id: row.get(1)?,
                        title: row.get(2)?,
                        content: row.get(3)?,
                        created_by: row.get(4)?,
                        created_at: parse_datetime(&row.get::<_, String>(5)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_course_announcements(&self, course_id: &str) -> Result<Vec<Announcement>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, course_id, title, content, created_by, created_at
             FROM announcements WHERE course_id = ?1 ORDER BY created_at DESC, id",
        )?;
        let rows = stmt.query_map(params![course_id], |row| {
            Ok(Announcement {
                id: row.get(0)?,
                course_id: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                created_by: row.get(4)?,
                created_at: parse_datetime(&row.get::<_, String>(5)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_announcement(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM announcements WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn upsert_reaction(&self, reaction: &Reaction) -> Result<()> {
        self.conn().execute(
            "INSERT INTO announcement_reactions (announcement_id, student_id, emoji, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(announcement_id, student_id) DO UPDATE SET
                 emoji = excluded.emoji,
                 updated_at = excluded.updated_at",
            params![
                reaction.announcement_id,
                reaction.student_id,
                reaction.emoji,
                format_datetime(&reaction.created_at),
                format_datetime(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn get_reaction(&self, announcement_id: &str, student_id: &str) -> Result<Option<Reaction>> {
        self.conn()
            .query_row(
                "SELECT announcement_id, student_id, emoji, created_at, updated_at
                 FROM announcement_reactions WHERE announcement_id = ?1 AND student_id = ?2",
                params![announcement_id, student_id],
                |row| {
                    Ok(Reaction {
                        announcement_id: row.get(0)?,
                        student_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: parse_datetime(&row.get::<_, String>(3)?),
                        updated_at: parse_datetime(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_announcement_reactions(&self, announcement_id: &str) -> Result<Vec<Reaction>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT announcement_id, student_id, emoji, created_at, updated_at
             FROM announcement_reactions WHERE announcement_id = ?1 ORDER BY created_at, student_id",
        )?;
        let rows = stmt.query_map(params![announcement_id], |row| {
            Ok(Reaction {
                announcement_id: row.get(0)?,
                student_id: row.get(1)?,
                emoji: row.get(2)?,
                created_at: parse_datetime(&row.get::<_, String>(3)?),
                updated_at: parse_datetime(&row.get::<_, String>(4)?),
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
