//! 考勤业务服务

use chrono::{Datelike, NaiveDate, Weekday};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use super::model::*;
use super::repository::TimeRecordRepository;
use crate::app::account::model::User;
use crate::app::account::repository::UserRepository;
use crate::core::{auth::Claims, CoreError, CoreResult, Paginated};
use crate::utils::{clean_optional, percentage, round2};

#[derive(Clone)]
pub struct AttendanceService {
    records: Arc<dyn TimeRecordRepository>,
    users: Arc<dyn UserRepository>,
    schedule: WorkSchedule,
    clock: Arc<dyn Clock>,
}

/// 区间内的工作日（周一至周五）
pub fn working_days(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| !matches!(day.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// 汇总若干员工在 [from, to] 内的打卡
pub fn compute_totals(
    records: &[TimeRecord],
    employees: u64,
    from: NaiveDate,
    to: NaiveDate,
) -> AttendanceTotals {
    let workdays: HashSet<NaiveDate> = working_days(from, to).into_iter().collect();

    let mut days: BTreeMap<(Uuid, NaiveDate), Vec<&TimeRecord>> = BTreeMap::new();
    for record in records {
        if record.work_date >= from && record.work_date <= to {
            days.entry((record.user_id, record.work_date))
                .or_default()
                .push(record);
        }
    }

    let mut totals = AttendanceTotals {
        working_days: workdays.len() as u64 * employees,
        ..Default::default()
    };
    let mut present_on_workdays = 0u64;
    let mut completed_days = 0u64;
    for ((_, date), day_records) in &days {
        let outcome = summarize_day(day_records);
        if !outcome.present {
            continue;
        }
        totals.days_present += 1;
        if workdays.contains(date) {
            present_on_workdays += 1;
        }
        totals.late_count += u64::from(outcome.late);
        totals.early_count += u64::from(outcome.early);
        totals.overtime_count += u64::from(outcome.overtime);
        if let Some(minutes) = outcome.worked_minutes {
            totals.total_worked_minutes += minutes;
            completed_days += 1;
        }
    }

    totals.days_absent = totals.working_days.saturating_sub(present_on_workdays);
    if completed_days > 0 {
        totals.average_worked_minutes =
            round2(totals.total_worked_minutes as f64 / completed_days as f64);
    }
    totals.attendance_rate = percentage(present_on_workdays, totals.working_days);
    totals.punctuality_rate = percentage(
        totals.days_present - totals.late_count,
        totals.days_present,
    );
    totals
}

fn department_of(user: &User) -> String {
    user.department
        .clone()
        .unwrap_or_else(|| UNASSIGNED_DEPARTMENT.to_string())
}

impl AttendanceService {
    pub fn new(
        records: Arc<dyn TimeRecordRepository>,
        users: Arc<dyn UserRepository>,
        schedule: WorkSchedule,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            records,
            users,
            schedule,
            clock,
        }
    }

    fn today(&self) -> NaiveDate {
        self.schedule.local_date(self.clock.utc())
    }

    /// 统计区间：默认本月初到今天；结束日期不超过今天
    fn resolve_range(&self, query: &StatsQuery) -> CoreResult<(NaiveDate, NaiveDate)> {
        let today = self.today();
        let from = query
            .from
            .unwrap_or_else(|| today.with_day(1).unwrap_or(today));
        let to = query.to.unwrap_or(today);
        if from > to {
            return Err(CoreError::BadRequest(
                "开始日期不能晚于结束日期".to_string(),
            ));
        }
        Ok((from, to))
    }

    /// 员工打卡
    pub async fn record(
        &self,
        claims: &Claims,
        req: CreateTimeRecordRequest,
    ) -> CoreResult<TimeRecord> {
        if !claims.role.is_staff() {
            return Err(CoreError::Forbidden);
        }
        req.validate()?;
        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .filter(|user| user.active)
            .ok_or(CoreError::Unauthorized)?;

        let now = self.clock.utc();
        let evaluation = self.schedule.evaluate(req.record_type, now);
        let record = TimeRecord {
            id: Uuid::new_v4(),
            user_id: user.id,
            employee_name: user.name,
            department: user.department,
            record_type: req.record_type,
            timestamp: now,
            work_date: evaluation.work_date,
            scheduled_at: evaluation.scheduled_at,
            minutes_diff: evaluation.minutes_diff,
            status: evaluation.status,
            note: clean_optional(req.note),
            created_at: now,
        };
        // 顺序检查与写入在存储层原子完成
        self.records.insert(&record).await?;
        info!(
            "{} {}: {:?} (相差 {} 分钟)",
            record.employee_name,
            record.record_type.label(),
            record.status,
            record.minutes_diff
        );
        Ok(record)
    }

    /// 员工只能查看自己的记录
    pub async fn list(
        &self,
        claims: &Claims,
        query: TimeRecordQuery,
    ) -> CoreResult<Paginated<TimeRecord>> {
        if !claims.role.is_staff() {
            return Err(CoreError::Forbidden);
        }
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(CoreError::BadRequest(
                    "开始日期不能晚于结束日期".to_string(),
                ));
            }
        }
        let page = query.page().normalize();
        let user_id = if claims.is_admin() {
            query.user_id
        } else {
            Some(claims.sub)
        };
        let filter = TimeRecordFilter {
            user_id,
            department: clean_optional(query.department),
            from: query.from,
            to: query.to,
            record_type: query.record_type,
            status: query.status,
        };
        let (records, total) = self.records.list(&filter, page).await?;
        Ok(Paginated::new(records, page, total))
    }

    pub async fn today_records(&self, claims: &Claims) -> CoreResult<Vec<TimeRecord>> {
        if !claims.role.is_staff() {
            return Err(CoreError::Forbidden);
        }
        self.records.for_day(claims.sub, self.today()).await
    }

    pub async fn today_summary(&self) -> CoreResult<TodaySummary> {
        let today = self.today();
        let staff: HashSet<Uuid> = self
            .users
            .list_staff()
            .await?
            .into_iter()
            .map(|user| user.id)
            .collect();
        let records = self
            .records
            .list_all(&TimeRecordFilter::between(today, today))
            .await?;

        let mut present = HashSet::new();
        let mut late = 0u64;
        let mut checked_out = HashSet::new();
        for record in records.iter().filter(|r| staff.contains(&r.user_id)) {
            match record.record_type {
                RecordType::CheckIn => {
                    present.insert(record.user_id);
                    if record.status == PunctualityStatus::Late {
                        late += 1;
                    }
                }
                RecordType::CheckOut => {
                    checked_out.insert(record.user_id);
                }
                _ => {}
            }
        }

        let total_employees = staff.len() as u64;
        let present_count = present.len() as u64;
        let on_time = present_count.saturating_sub(late);
        let checked_out_count = checked_out.intersection(&present).count() as u64;
        debug!("{} 考勤: {}/{} 已到岗", today, present_count, total_employees);

        Ok(TodaySummary {
            date: today,
            total_employees,
            present: present_count,
            absent: total_employees.saturating_sub(present_count),
            late,
            on_time,
            checked_out: checked_out_count,
            still_working: present_count.saturating_sub(checked_out_count),
            attendance_rate: percentage(present_count, total_employees),
            punctuality_rate: percentage(on_time, present_count),
        })
    }

    /// 员工本人或管理员可查看
    pub async fn employee_stats(
        &self,
        claims: &Claims,
        user_id: Uuid,
        query: StatsQuery,
    ) -> CoreResult<EmployeeStats> {
        if !claims.is_admin() && claims.sub != user_id {
            return Err(CoreError::Forbidden);
        }
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("用户不存在"))?;
        let (from, to) = self.resolve_range(&query)?;
        let effective_to = to.min(self.today());

        let filter = TimeRecordFilter {
            user_id: Some(user.id),
            ..TimeRecordFilter::between(from, effective_to)
        };
        let records = self.records.list_all(&filter).await?;

        Ok(EmployeeStats {
            user_id: user.id,
            name: user.name,
            department: user.department,
            from,
            to,
            totals: compute_totals(&records, 1, from, effective_to),
        })
    }

    /// 按部门汇总，未分配部门的员工归入 unassigned
    pub async fn department_stats(&self, query: StatsQuery) -> CoreResult<Vec<DepartmentStats>> {
        let (from, to) = self.resolve_range(&query)?;
        let effective_to = to.min(self.today());

        let mut members: BTreeMap<String, HashSet<Uuid>> = BTreeMap::new();
        for user in self.users.list_staff().await? {
            members.entry(department_of(&user)).or_default().insert(user.id);
        }
        let records = self
            .records
            .list_all(&TimeRecordFilter::between(from, effective_to))
            .await?;

        let mut by_user: HashMap<Uuid, Vec<TimeRecord>> = HashMap::new();
        for record in records {
            by_user.entry(record.user_id).or_default().push(record);
        }

        let mut stats: Vec<DepartmentStats> = members
            .into_iter()
            .map(|(department, ids)| {
                let records: Vec<TimeRecord> = ids
                    .iter()
                    .filter_map(|id| by_user.get(id))
                    .flatten()
                    .cloned()
                    .collect();
                DepartmentStats {
                    department,
                    employees: ids.len() as u64,
                    from,
                    to,
                    totals: compute_totals(&records, ids.len() as u64, from, effective_to),
                }
            })
            .collect();
        // unassigned 排在最后
        stats.sort_by_key(|s| s.department == UNASSIGNED_DEPARTMENT);
        Ok(stats)
    }

    pub async fn delete(&self, id: Uuid) -> CoreResult<()> {
        if !self.records.delete(id).await? {
            return Err(CoreError::not_found("打卡记录不存在"));
        }
        info!("删除打卡记录: {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::account::repository::MemoryUserRepository;
    use crate::app::attendance::repository::MemoryTimeRecordRepository;
    use crate::core::auth::Role;
    use chrono::{DateTime, Local, TimeZone, Utc};
    use std::sync::Mutex;

    /// 测试用时钟，可手动拨动
    struct TestClock(Mutex<DateTime<Utc>>);

    impl TestClock {
        fn at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(now)))
        }

        fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for TestClock {
        fn local(&self) -> DateTime<Local> {
            self.utc().with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn utc(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        // 2026-10-19 是周一
        Utc.with_ymd_and_hms(2026, 10, d, h, m, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn user(name: &str, role: Role, department: Option<&str>) -> User {
        let now = utc(1, 0, 0);
        User {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", name.to_lowercase()),
            name: name.to_string(),
            password_hash: String::new(),
            role,
            department: department.map(str::to_string),
            phone: None,
            company: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn claims_for(user: &User) -> Claims {
        Claims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            iat: 0,
            exp: 0,
        }
    }

    struct Fixture {
        service: AttendanceService,
        clock: Arc<TestClock>,
        alice: User,
        bob: User,
        carol: User,
        customer: User,
    }

    async fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserRepository::default());
        let alice = user("Alice", Role::Employee, Some("Lab"));
        let bob = user("Bob", Role::Employee, Some("Lab"));
        let carol = user("Carol", Role::Admin, None);
        let customer = user("Dave", Role::Customer, None);
        for u in [&alice, &bob, &carol, &customer] {
            users.create(u).await.unwrap();
        }
        let clock = TestClock::at(utc(19, 9, 0));
        let service = AttendanceService::new(
            Arc::new(MemoryTimeRecordRepository::default()),
            users,
            WorkSchedule::default(),
            clock.clone(),
        );
        Fixture {
            service,
            clock,
            alice,
            bob,
            carol,
            customer,
        }
    }

    async fn punch(
        f: &Fixture,
        who: &User,
        at: DateTime<Utc>,
        record_type: RecordType,
    ) -> TimeRecord {
        f.clock.set(at);
        f.service
            .record(
                &claims_for(who),
                CreateTimeRecordRequest {
                    record_type,
                    note: None,
                },
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_working_days_skip_weekends() {
        // 10-17 周六 至 10-23 周五
        assert_eq!(working_days(day(17), day(23)).len(), 5);
        assert_eq!(working_days(day(18), day(18)).len(), 0);
        assert!(working_days(day(20), day(19)).is_empty());
    }

    #[tokio::test]
    async fn test_record_status_and_sequence() {
        let f = fixture().await;
        let record = punch(&f, &f.alice, utc(19, 9, 20), RecordType::CheckIn).await;
        assert_eq!(record.status, PunctualityStatus::Late);
        assert_eq!(record.minutes_diff, 20);
        assert_eq!(record.department.as_deref(), Some("Lab"));

        f.clock.set(utc(19, 9, 30));
        let err = f
            .service
            .record(
                &claims_for(&f.alice),
                CreateTimeRecordRequest { record_type: RecordType::CheckIn, note: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err = f
            .service
            .record(
                &claims_for(&f.bob),
                CreateTimeRecordRequest { record_type: RecordType::CheckOut, note: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err = f
            .service
            .record(
                &claims_for(&f.customer),
                CreateTimeRecordRequest { record_type: RecordType::CheckIn, note: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));

        let out = punch(&f, &f.alice, utc(19, 17, 40), RecordType::CheckOut).await;
        assert_eq!(out.status, PunctualityStatus::Early);
        assert_eq!(f.service.today_records(&claims_for(&f.alice)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_today_summary() {
        let f = fixture().await;
        punch(&f, &f.alice, utc(19, 9, 20), RecordType::CheckIn).await;
        punch(&f, &f.bob, utc(19, 8, 55), RecordType::CheckIn).await;
        punch(&f, &f.bob, utc(19, 18, 0), RecordType::CheckOut).await;

        let summary = f.service.today_summary().await.unwrap();
        assert_eq!(summary.date, day(19));
        assert_eq!(summary.total_employees, 3);
        assert_eq!(summary.present, 2);
        assert_eq!(summary.absent, 1);
        assert_eq!(summary.late, 1);
        assert_eq!(summary.on_time, 1);
        assert_eq!(summary.checked_out, 1);
        assert_eq!(summary.still_working, 1);
        assert_eq!(summary.attendance_rate, 66.67);
        assert_eq!(summary.punctuality_rate, 50.0);
    }

    #[tokio::test]
    async fn test_employee_and_department_stats() {
        let f = fixture().await;
        // 周一：迟到，午休 1 小时
        punch(&f, &f.alice, utc(19, 9, 30), RecordType::CheckIn).await;
        punch(&f, &f.alice, utc(19, 12, 0), RecordType::LunchStart).await;
        punch(&f, &f.alice, utc(19, 13, 0), RecordType::LunchEnd).await;
        punch(&f, &f.alice, utc(19, 18, 30), RecordType::CheckOut).await;
        // 周二：准时，加班
        punch(&f, &f.alice, utc(20, 9, 0), RecordType::CheckIn).await;
        punch(&f, &f.alice, utc(20, 19, 0), RecordType::CheckOut).await;
        punch(&f, &f.carol, utc(20, 9, 5), RecordType::CheckIn).await;
        // 当前是周三 10:00，周三尚未打卡
        f.clock.set(utc(21, 10, 0));

        let query = || StatsQuery {
            from: Some(day(19)),
            to: Some(day(31)),
        };
        let stats = f
            .service
            .employee_stats(&claims_for(&f.alice), f.alice.id, query())
            .await
            .unwrap();
        assert_eq!(stats.totals.working_days, 3);
        assert_eq!(stats.totals.days_present, 2);
        assert_eq!(stats.totals.days_absent, 1);
        assert_eq!(stats.totals.late_count, 1);
        assert_eq!(stats.totals.overtime_count, 2);
        assert_eq!(stats.totals.total_worked_minutes, 480 + 600);
        assert_eq!(stats.totals.average_worked_minutes, 540.0);
        assert_eq!(stats.totals.attendance_rate, 66.67);
        assert_eq!(stats.totals.punctuality_rate, 50.0);

        let err = f
            .service
            .employee_stats(&claims_for(&f.bob), f.alice.id, query())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));

        let departments = f.service.department_stats(query()).await.unwrap();
        let names: Vec<&str> = departments.iter().map(|d| d.department.as_str()).collect();
        assert_eq!(names, vec!["Lab", UNASSIGNED_DEPARTMENT]);
        let lab = &departments[0];
        assert_eq!(lab.employees, 2);
        assert_eq!(lab.totals.working_days, 6);
        assert_eq!(lab.totals.days_present, 2);
        assert_eq!(lab.totals.days_absent, 4);
        assert_eq!(departments[1].totals.days_present, 1);
    }

    #[tokio::test]
    async fn test_list_scoped_to_employee_and_admin_delete() {
        let f = fixture().await;
        let alice_in = punch(&f, &f.alice, utc(19, 9, 0), RecordType::CheckIn).await;
        punch(&f, &f.bob, utc(19, 9, 0), RecordType::CheckIn).await;

        let own = f
            .service
            .list(&claims_for(&f.alice), TimeRecordQuery::default())
            .await
            .unwrap();
        assert_eq!(own.pagination.total, 1);

        let all = f
            .service
            .list(&claims_for(&f.carol), TimeRecordQuery::default())
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 2);

        f.service.delete(alice_in.id).await.unwrap();
        assert!(f.service.delete(alice_in.id).await.is_err());
        // 删除后可以重新打卡
        punch(&f, &f.alice, utc(19, 9, 10), RecordType::CheckIn).await;
    }
}
