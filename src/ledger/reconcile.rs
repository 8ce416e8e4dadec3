use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Allocation, Course, Enrollment};

/// Method label stamped on allocations created by bulk assignment.
pub const AUTO_ASSIGN_METHOD: &str = "auto_assign";

/// Financial rollup for one course. `expected - completed == pending` holds
/// by construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseBalance {
    pub expected: Decimal,
    pub completed: Decimal,
    pub pending: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentBalance {
    pub total_paid: Decimal,
    /// Not clamped: goes negative when over-allocated.
    pub remaining: Decimal,
}

/// Computes the course rollup on read. Inactive enrollments are excluded from
/// both sides; their historical allocations do not count.
pub fn course_balance(store: &dyn Store, course: &Course) -> Result<CourseBalance> {
    let enrollments = store.list_course_enrollments(&course.id, true)?;

    let expected = course.price * Decimal::from(enrollments.len());
    let mut completed = Decimal::ZERO;
    for enrollment in &enrollments {
        completed += store.sum_enrollment_allocations(&enrollment.id)?;
    }

    Ok(CourseBalance {
        expected,
        completed,
        pending: expected - completed,
    })
}

pub fn enrollment_balance(
    store: &dyn Store,
    course_price: Decimal,
    enrollment_id: &str,
) -> Result<EnrollmentBalance> {
    let total_paid = store.sum_enrollment_allocations(enrollment_id)?;
    Ok(EnrollmentBalance {
        total_paid,
        remaining: course_price - total_paid,
    })
}

/// Assigns unallocated ledger payments to an enrollment. Missing, inactive,
/// and already-allocated payments are skipped silently; only the aggregate
/// count comes back. The unique index on the allocation's payment reference
/// backstops the existence check, so a concurrent double-assign lands here as
/// a conflict and counts as a skip.
pub fn assign_payments(
    store: &dyn Store,
    enrollment: &Enrollment,
    payment_ids: &[String],
    created_by: &str,
) -> Result<usize> {
    let mut assigned = 0;
    for payment_id in payment_ids {
        let Some(payment) = store.get_payment(payment_id)? else {
            continue;
        };
        if !payment.is_active || store.payment_is_allocated(payment_id)? {
            continue;
        }

        let allocation = Allocation {
            id: Uuid::new_v4().to_string(),
            enrollment_id: enrollment.id.clone(),
            payment_id: Some(payment.id.clone()),
            amount: payment.amount,
            payment_date: payment.transaction_date,
            method: Some(AUTO_ASSIGN_METHOD.to_string()),
            notes: Some(format!("assigned from ledger - {}", payment.description)),
            created_by: created_by.to_string(),
            created_at: Utc::now(),
        };

        match store.create_allocation(&allocation) {
            Ok(()) => assigned += 1,
            Err(Error::PaymentAlreadyAllocated) => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(assigned)
}

/// Deletes one allocation, verifying first that its enrollment belongs to the
/// course named in the request path. Cross-course attempts are rejected.
pub fn delete_course_allocation(
    store: &dyn Store,
    course_id: &str,
    allocation_id: &str,
) -> Result<()> {
    let allocation = store.get_allocation(allocation_id)?.ok_or(Error::NotFound)?;
    let enrollment = store
        .get_enrollment(&allocation.enrollment_id)?
        .ok_or(Error::NotFound)?;

    if enrollment.course_id != course_id {
        return Err(Error::BadRequest(
            "allocation does not belong to this course".to_string(),
        ));
    }

    store.delete_allocation(allocation_id)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Account, Payment, Role};
    use chrono::NaiveDate;

    fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (dir, store)
    }

    fn account(store: &SqliteStore, role: Role) -> Account {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: format!("{}@example.com", Uuid::new_v4()),
            password_hash: "x".to_string(),
            role,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        store.create_account(&account).unwrap();
        account
    }

    fn course(store: &SqliteStore, price: i64) -> Course {
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4().to_string(),
            name: "Spanish B2".to_string(),
            instructor_name: "Marta".to_string(),
            price: Decimal::from(price),
            description: None,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        store.create_course(&course).unwrap();
        course
    }

    fn enroll(store: &SqliteStore, course: &Course, student: &Account, admin: &Account) -> Enrollment {
        let enrollment = Enrollment {
            id: Uuid::new_v4().to_string(),
            course_id: course.id.clone(),
            student_id: student.id.clone(),
            enrolled_by: admin.id.clone(),
            enrolled_at: Utc::now(),
            is_active: true,
        };
        store.create_enrollment(&enrollment).unwrap();
        enrollment
    }

    fn ledger_payment(store: &SqliteStore, admin: &Account, desc: &str, amount: i64) -> Payment {
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: desc.to_string(),
            amount: Decimal::from(amount),
            reference_no: None,
            payment_type: None,
            student_id: None,
            created_by: admin.id.clone(),
            created_at: Utc::now(),
            is_active: true,
        };
        store.create_payment(&payment).unwrap();
        payment
    }

    fn manual_allocation(store: &SqliteStore, enrollment: &Enrollment, admin: &Account, amount: i64) {
        store
            .create_allocation(&Allocation {
                id: Uuid::new_v4().to_string(),
                enrollment_id: enrollment.id.clone(),
                payment_id: None,
                amount: Decimal::from(amount),
                payment_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                method: Some("cash".to_string()),
                notes: None,
                created_by: admin.id.clone(),
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn test_course_balance_rollup() {
        let (_dir, store) = open_store();
        let admin = account(&store, Role::Admin);
        let a = account(&store, Role::Student);
        let b = account(&store, Role::Student);
        let course = course(&store, 1000);

        let enrollment_a = enroll(&store, &course, &a, &admin);
        let _enrollment_b = enroll(&store, &course, &b, &admin);
        manual_allocation(&store, &enrollment_a, &admin, 400);

        let balance = course_balance(&store, &course).unwrap();
        assert_eq!(balance.expected, Decimal::from(2000));
        assert_eq!(balance.completed, Decimal::from(400));
        assert_eq!(balance.pending, Decimal::from(1600));
        assert_eq!(balance.expected - balance.completed, balance.pending);
    }

    #[test]
    fn test_deactivated_enrollment_leaves_balance() {
        let (_dir, store) = open_store();
        let admin = account(&store, Role::Admin);
        let a = account(&store, Role::Student);
        let b = account(&store, Role::Student);
        let course = course(&store, 1000);

        let enrollment_a = enroll(&store, &course, &a, &admin);
        let _enrollment_b = enroll(&store, &course, &b, &admin);
        manual_allocation(&store, &enrollment_a, &admin, 400);

        store.deactivate_enrollment(&enrollment_a.id).unwrap();

        let balance = course_balance(&store, &course).unwrap();
        assert_eq!(balance.expected, Decimal::from(1000));
        assert_eq!(balance.completed, Decimal::ZERO);
        assert_eq!(balance.pending, Decimal::from(1000));
    }

    #[test]
    fn test_enrollment_balance_can_go_negative() {
        let (_dir, store) = open_store();
        let admin = account(&store, Role::Admin);
        let student = account(&store, Role::Student);
        let course = course(&store, 1000);

        let enrollment = enroll(&store, &course, &student, &admin);
        manual_allocation(&store, &enrollment, &admin, 700);
        manual_allocation(&store, &enrollment, &admin, 700);

        let balance = enrollment_balance(&store, course.price, &enrollment.id).unwrap();
        assert_eq!(balance.total_paid, Decimal::from(1400));
        assert_eq!(balance.remaining, Decimal::from(-400));
    }

    #[test]
    fn test_assign_payments_skips_allocated_and_inactive() {
        let (_dir, store) = open_store();
        let admin = account(&store, Role::Admin);
        let student = account(&store, Role::Student);
        let course = course(&store, 1000);
        let enrollment = enroll(&store, &course, &student, &admin);

        let p1 = ledger_payment(&store, &admin, "Ahmet", 500);
        let p2 = ledger_payment(&store, &admin, "Zeynep", 750);
        let p3 = ledger_payment(&store, &admin, "Kerem", 250);

        // p3 is already allocated elsewhere.
        let other_student = account(&store, Role::Student);
        let other_enrollment = enroll(&store, &course, &other_student, &admin);
        assert_eq!(
            assign_payments(&store, &other_enrollment, &[p3.id.clone()], &admin.id).unwrap(),
            1
        );

        let assigned = assign_payments(
            &store,
            &enrollment,
            &[p1.id.clone(), p2.id.clone(), p3.id.clone()],
            &admin.id,
        )
        .unwrap();
        assert_eq!(assigned, 2);

        let allocations = store.list_enrollment_allocations(&enrollment.id).unwrap();
        assert_eq!(allocations.len(), 2);
        assert!(allocations.iter().all(|a| a.method.as_deref() == Some(AUTO_ASSIGN_METHOD)));

        // Missing and unknown ids are skipped silently.
        let assigned = assign_payments(
            &store,
            &enrollment,
            &[p1.id.clone(), "nope".to_string()],
            &admin.id,
        )
        .unwrap();
        assert_eq!(assigned, 0);
    }

    #[test]
    fn test_cross_course_allocation_delete_rejected() {
        let (_dir, store) = open_store();
        let admin = account(&store, Role::Admin);
        let student = account(&store, Role::Student);
        let course_a = course(&store, 1000);
        let course_b = course(&store, 2000);
        let enrollment = enroll(&store, &course_a, &student, &admin);
        manual_allocation(&store, &enrollment, &admin, 400);

        let allocation_id = store.list_enrollment_allocations(&enrollment.id).unwrap()[0]
            .id
            .clone();

        let err = delete_course_allocation(&store, &course_b.id, &allocation_id).unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(store.get_allocation(&allocation_id).unwrap().is_some());

        delete_course_allocation(&store, &course_a.id, &allocation_id).unwrap();
        assert!(store.get_allocation(&allocation_id).unwrap().is_none());
    }
}
