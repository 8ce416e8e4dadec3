mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::Result;
use crate::types::*;

/// Filter for the admin payment list.
#[derive(Debug, Default, Clone)]
pub struct PaymentFilter {
    /// Matches description substring, or the exact amount when numeric.
    pub search: Option<String>,
    /// Only payments on or after this date.
    pub since: Option<NaiveDate>,
    /// Only payments on exactly this date.
    pub on: Option<NaiveDate>,
    pub cursor: String,
    pub limit: i32,
}

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Server metadata
    fn get_meta(&self, key: &str) -> Result<Option<String>>;
    fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    // Account operations
    fn create_account(&self, account: &Account) -> Result<()>;
    fn get_account(&self, id: &str) -> Result<Option<Account>>;
    fn get_account_by_email(&self, email: &str) -> Result<Option<Account>>;
    fn list_students(
        &self,
        search: Option<&str>,
        active: Option<bool>,
        cursor: &str,
        limit: i32,
    ) -> Result<Vec<Account>>;
    fn update_account(&self, account: &Account) -> Result<()>;
    fn delete_account(&self, id: &str) -> Result<bool>;
    fn has_admin_account(&self) -> Result<bool>;

    // Student profile operations
    fn upsert_student_profile(&self, profile: &StudentProfile) -> Result<()>;
    fn get_student_profile(&self, account_id: &str) -> Result<Option<StudentProfile>>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Course operations
    fn create_course(&self, course: &Course) -> Result<()>;
    fn get_course(&self, id: &str) -> Result<Option<Course>>;
    fn list_courses(&self) -> Result<Vec<Course>>;
    fn update_course(&self, course: &Course) -> Result<()>;
    fn delete_course(&self, id: &str) -> Result<bool>;
    fn replace_course_schedules(&self, course_id: &str, slots: &[ScheduleSlot]) -> Result<()>;
    fn list_course_schedules(&self, course_id: &str) -> Result<Vec<ScheduleSlot>>;

    // Enrollment operations
    fn create_enrollment(&self, enrollment: &Enrollment) -> Result<()>;
    fn get_enrollment(&self, id: &str) -> Result<Option<Enrollment>>;
    fn get_active_enrollment(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<Option<Enrollment>>;
    fn list_course_enrollments(&self, course_id: &str, active_only: bool)
    -> Result<Vec<Enrollment>>;
    fn list_student_enrollments(
        &self,
        student_id: &str,
        active_only: bool,
    ) -> Result<Vec<Enrollment>>;
    /// Flips the enrollment inactive and hard-deletes its allocations, atomically.
    fn deactivate_enrollment(&self, id: &str) -> Result<()>;

    // Ledger payment operations
    fn create_payment(&self, payment: &Payment) -> Result<()>;
    fn get_payment(&self, id: &str) -> Result<Option<Payment>>;
    fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>>;
    fn payment_exists(&self, date: NaiveDate, description: &str, amount: Decimal) -> Result<bool>;
    /// Inserts rows whose (date, description, amount) triple is not already
    /// present, in one transaction. Returns the count actually inserted.
    fn insert_payments(&self, payments: &[Payment]) -> Result<usize>;
    /// Deletes the given ledger payments and their dependent allocations, in
    /// one transaction. Returns the count actually deleted.
    fn delete_payments(&self, ids: &[String]) -> Result<usize>;
    /// Active payments that no allocation references.
    fn list_unassigned_payments(&self) -> Result<Vec<Payment>>;

    // Allocation operations
    fn create_allocation(&self, allocation: &Allocation) -> Result<()>;
    fn get_allocation(&self, id: &str) -> Result<Option<Allocation>>;
    fn payment_is_allocated(&self, payment_id: &str) -> Result<bool>;
    fn list_enrollment_allocations(&self, enrollment_id: &str) -> Result<Vec<Allocation>>;
    fn sum_enrollment_allocations(&self, enrollment_id: &str) -> Result<Decimal>;
    fn delete_allocation(&self, id: &str) -> Result<bool>;

    // Announcement operations
    fn create_announcement(&self, announcement: &Announcement) -> Result<()>;
    fn get_announcement(&self, id: &str) -> Result<Option<Announcement>>;
    fn list_course_announcements(&self, course_id: &str) -> Result<Vec<Announcement>>;
    fn delete_announcement(&self, id: &str) -> Result<bool>;
    fn upsert_reaction(&self, reaction: &Reaction) -> Result<()>;
    fn get_reaction(&self, announcement_id: &str, student_id: &str) -> Result<Option<Reaction>>;
    fn list_announcement_reactions(&self, announcement_id: &str) -> Result<Vec<Reaction>>;

    fn close(&self) -> Result<()>;
}
