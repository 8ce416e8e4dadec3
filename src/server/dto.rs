use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::import::SelectedRow;
use crate::ledger::reconcile::{CourseBalance, EnrollmentBalance};
use crate::types::{Account, Announcement, Course, Enrollment, Payment, ScheduleSlot, StudentProfile};

// ---- Auth & accounts ----

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: Account,
}

#[derive(Debug, Serialize)]
pub struct CsrfResponse {
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StudentResponse {
    #[serde(flatten)]
    pub account: Account,
    pub profile: StudentProfile,
}

#[derive(Debug, Deserialize)]
pub struct StudentStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct StudentListParams {
    pub search: Option<String>,
    pub cursor: Option<String>,
}

// ---- Courses ----

#[derive(Debug, Deserialize)]
pub struct ScheduleSlotRequest {
    pub day_of_week: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Deserialize)]
pub struct CourseRequest {
    pub name: String,
    pub instructor_name: String,
    pub price: Decimal,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub schedule: Vec<ScheduleSlotRequest>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CourseResponse {
    #[serde(flatten)]
    pub course: Course,
    pub schedule: Vec<ScheduleSlot>,
}

#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    #[serde(flatten)]
    pub course: Course,
    pub schedule: Vec<ScheduleSlot>,
    pub balance: CourseBalance,
    pub enrollments: Vec<EnrolledStudent>,
}

#[derive(Debug, Serialize)]
pub struct EnrolledStudent {
    pub enrollment: Enrollment,
    pub student: StudentResponse,
    pub balance: EnrollmentBalance,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub student_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub enrolled: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct MyCourseResponse {
    pub course: Course,
    pub schedule: Vec<ScheduleSlot>,
    pub enrolled_at: DateTime<Utc>,
    pub balance: EnrollmentBalance,
}

// ---- Announcements ----

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct AnnouncementResponse {
    #[serde(flatten)]
    pub announcement: Announcement,
    pub reactions: Vec<ReactionCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_reaction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

// ---- Ledger ----

#[derive(Debug, Deserialize)]
pub struct PaymentListParams {
    pub search: Option<String>,
    /// One of "today", "week", "month".
    pub filter: Option<String>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub transaction_date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub reference_no: Option<String>,
    pub payment_type: Option<String>,
    pub student_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub payments: Vec<SelectedRow>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub inserted: usize,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIdsRequest {
    pub payment_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AssignResponse {
    pub assigned: usize,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct PendingPaymentsResponse {
    pub payments: Vec<Payment>,
}
