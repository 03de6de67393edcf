//! 考勤数据模型与准时判定

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::config::{parse_clock_time, AttendanceConfig, ConfigError};
use crate::core::PageQuery;

/// 打卡类型，按一天内的先后顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    CheckIn,
    LunchStart,
    LunchEnd,
    CheckOut,
}

impl RecordType {
    pub fn label(self) -> &'static str {
        match self {
            RecordType::CheckIn => "上班打卡",
            RecordType::LunchStart => "午休开始",
            RecordType::LunchEnd => "午休结束",
            RecordType::CheckOut => "下班打卡",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::Type))]
#[cfg_attr(feature = "database", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PunctualityStatus {
    OnTime,
    Late,
    Early,
    Overtime,
}

pub const DEFAULT_GRACE_MINUTES: i64 = 15;

/// 根据实际与计划时间的差值（分钟，晚为正）判定状态；恰好等于宽限值算准时
pub fn calculate_status(
    record_type: RecordType,
    minutes_diff: i64,
    grace_minutes: i64,
) -> PunctualityStatus {
    match record_type {
        RecordType::CheckIn | RecordType::LunchEnd => {
            if minutes_diff > grace_minutes {
                PunctualityStatus::Late
            } else {
                PunctualityStatus::OnTime
            }
        }
        RecordType::CheckOut => {
            if minutes_diff < -grace_minutes {
                PunctualityStatus::Early
            } else if minutes_diff > grace_minutes {
                PunctualityStatus::Overtime
            } else {
                PunctualityStatus::OnTime
            }
        }
        RecordType::LunchStart => {
            if minutes_diff < -grace_minutes {
                PunctualityStatus::Early
            } else {
                PunctualityStatus::OnTime
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "database", derive(sqlx::FromRow))]
pub struct TimeRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub employee_name: String,
    pub department: Option<String>,
    pub record_type: RecordType,
    pub timestamp: DateTime<Utc>,
    /// 考勤时区下的日期
    pub work_date: NaiveDate,
    pub scheduled_at: DateTime<Utc>,
    pub minutes_diff: i64,
    pub status: PunctualityStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 一次打卡的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub work_date: NaiveDate,
    pub scheduled_at: DateTime<Utc>,
    pub minutes_diff: i64,
    pub status: PunctualityStatus,
}

/// 作息时间表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSchedule {
    pub work_start: NaiveTime,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    pub work_end: NaiveTime,
    pub grace_minutes: i64,
    pub utc_offset_minutes: i32,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            work_start: at(9, 0),
            lunch_start: at(12, 0),
            lunch_end: at(13, 0),
            work_end: at(18, 0),
            grace_minutes: DEFAULT_GRACE_MINUTES,
            utc_offset_minutes: 0,
        }
    }
}

impl WorkSchedule {
    pub fn from_config(config: &AttendanceConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            work_start: parse_clock_time(&config.work_start)?,
            lunch_start: parse_clock_time(&config.lunch_start)?,
            lunch_end: parse_clock_time(&config.lunch_end)?,
            work_end: parse_clock_time(&config.work_end)?,
            grace_minutes: config.grace_minutes,
            utc_offset_minutes: config.utc_offset_minutes,
        })
    }

    fn offset(&self) -> Duration {
        Duration::minutes(i64::from(self.utc_offset_minutes))
    }

    pub fn planned_time(&self, record_type: RecordType) -> NaiveTime {
        match record_type {
            RecordType::CheckIn => self.work_start,
            RecordType::LunchStart => self.lunch_start,
            RecordType::LunchEnd => self.lunch_end,
            RecordType::CheckOut => self.work_end,
        }
    }

    /// 考勤时区下的日期
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        (at.naive_utc() + self.offset()).date()
    }

    /// 某天某类打卡的计划时刻（UTC）
    pub fn scheduled_at(&self, date: NaiveDate, record_type: RecordType) -> DateTime<Utc> {
        let local = date.and_time(self.planned_time(record_type));
        Utc.from_utc_datetime(&(local - self.offset()))
    }

    pub fn evaluate(&self, record_type: RecordType, at: DateTime<Utc>) -> Evaluation {
        let work_date = self.local_date(at);
        let scheduled_at = self.scheduled_at(work_date, record_type);
        let minutes_diff = (at - scheduled_at).num_minutes();
        Evaluation {
            work_date,
            scheduled_at,
            minutes_diff,
            status: calculate_status(record_type, minutes_diff, self.grace_minutes),
        }
    }
}

/// 检查当天打卡顺序：上班 → [午休开始 → 午休结束] → 下班，每类最多一次
pub fn check_sequence(existing: &[RecordType], next: RecordType) -> Result<(), String> {
    let has = |t: RecordType| existing.contains(&t);
    if has(next) {
        return Err(format!("今天已经{}", next.label()));
    }
    match next {
        RecordType::CheckIn => Ok(()),
        _ if !has(RecordType::CheckIn) => Err("请先上班打卡".to_string()),
        _ if has(RecordType::CheckOut) => Err("今天已经下班打卡".to_string()),
        RecordType::LunchStart => Ok(()),
        RecordType::LunchEnd if !has(RecordType::LunchStart) => {
            Err("请先记录午休开始".to_string())
        }
        RecordType::LunchEnd => Ok(()),
        RecordType::CheckOut if has(RecordType::LunchStart) && !has(RecordType::LunchEnd) => {
            Err("请先记录午休结束".to_string())
        }
        RecordType::CheckOut => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTimeRecordRequest {
    pub record_type: RecordType,
    #[validate(length(max = 500, message = "备注过长"))]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeRecordQuery {
    pub user_id: Option<Uuid>,
    pub department: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub record_type: Option<RecordType>,
    pub status: Option<PunctualityStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl TimeRecordQuery {
    pub fn page(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TimeRecordFilter {
    pub user_id: Option<Uuid>,
    pub department: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub record_type: Option<RecordType>,
    pub status: Option<PunctualityStatus>,
}

impl TimeRecordFilter {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &TimeRecord) -> bool {
        if self.user_id.is_some_and(|id| id != record.user_id) {
            return false;
        }
        if let Some(department) = &self.department {
            if record.department.as_deref() != Some(department.as_str()) {
                return false;
            }
        }
        if self.from.is_some_and(|from| record.work_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| record.work_date > to) {
            return false;
        }
        if self.record_type.is_some_and(|t| t != record.record_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        true
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodaySummary {
    pub date: NaiveDate,
    pub total_employees: u64,
    pub present: u64,
    pub absent: u64,
    pub late: u64,
    pub on_time: u64,
    pub checked_out: u64,
    pub still_working: u64,
    pub attendance_rate: f64,
    pub punctuality_rate: f64,
}

/// 一段时间内的考勤汇总，员工和部门统计共用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceTotals {
    pub working_days: u64,
    pub days_present: u64,
    pub days_absent: u64,
    pub late_count: u64,
    pub early_count: u64,
    pub overtime_count: u64,
    pub total_worked_minutes: i64,
    pub average_worked_minutes: f64,
    pub attendance_rate: f64,
    pub punctuality_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeStats {
    pub user_id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentStats {
    pub department: String,
    pub employees: u64,
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(flatten)]
    pub totals: AttendanceTotals,
}

pub const UNASSIGNED_DEPARTMENT: &str = "unassigned";

/// 一个员工一天的打卡情况
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayOutcome {
    pub present: bool,
    pub late: bool,
    pub early: bool,
    pub overtime: bool,
    /// 上下班都打卡时的工作分钟数（扣除午休）
    pub worked_minutes: Option<i64>,
}

pub fn summarize_day(records: &[&TimeRecord]) -> DayOutcome {
    let find = |t: RecordType| records.iter().find(|r| r.record_type == t);
    let check_in = find(RecordType::CheckIn);
    let check_out = find(RecordType::CheckOut);

    let lunch = match (find(RecordType::LunchStart), find(RecordType::LunchEnd)) {
        (Some(start), Some(end)) => (end.timestamp - start.timestamp).num_minutes().max(0),
        _ => 0,
    };
    let worked_minutes = match (check_in, check_out) {
        (Some(start), Some(end)) => {
            Some(((end.timestamp - start.timestamp).num_minutes() - lunch).max(0))
        }
        _ => None,
    };

    DayOutcome {
        present: check_in.is_some(),
        late: check_in.is_some_and(|r| r.status == PunctualityStatus::Late),
        early: check_out.is_some_and(|r| r.status == PunctualityStatus::Early),
        overtime: check_out.is_some_and(|r| r.status == PunctualityStatus::Overtime),
        worked_minutes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_calculate_status_boundaries() {
        use PunctualityStatus::*;
        use RecordType::*;
        let grace = DEFAULT_GRACE_MINUTES;

        assert_eq!(calculate_status(CheckIn, 15, grace), OnTime);
        assert_eq!(calculate_status(CheckIn, 16, grace), Late);
        assert_eq!(calculate_status(CheckIn, -60, grace), OnTime);
        assert_eq!(calculate_status(LunchEnd, 16, grace), Late);

        assert_eq!(calculate_status(CheckOut, -15, grace), OnTime);
        assert_eq!(calculate_status(CheckOut, -16, grace), Early);
        assert_eq!(calculate_status(CheckOut, 15, grace), OnTime);
        assert_eq!(calculate_status(CheckOut, 16, grace), Overtime);

        assert_eq!(calculate_status(LunchStart, -16, grace), Early);
        assert_eq!(calculate_status(LunchStart, 30, grace), OnTime);
    }

    #[test]
    fn test_schedule_uses_local_offset() {
        let schedule = WorkSchedule {
            utc_offset_minutes: 8 * 60,
            ..Default::default()
        };
        // 北京时间 2026-10-19 09:20 = UTC 01:20
        let eval = schedule.evaluate(RecordType::CheckIn, utc(2026, 10, 19, 1, 20));
        assert_eq!(eval.work_date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(eval.scheduled_at, utc(2026, 10, 19, 1, 0));
        assert_eq!(eval.minutes_diff, 20);
        assert_eq!(eval.status, PunctualityStatus::Late);

        // UTC 前一天 23:30 已是本地次日 07:30
        let eval = schedule.evaluate(RecordType::CheckIn, utc(2026, 10, 18, 23, 30));
        assert_eq!(eval.work_date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(eval.minutes_diff, -90);
        assert_eq!(eval.status, PunctualityStatus::OnTime);
    }

    #[test]
    fn test_check_sequence() {
        use RecordType::*;
        assert!(check_sequence(&[], CheckIn).is_ok());
        assert!(check_sequence(&[], CheckOut).is_err());
        assert!(check_sequence(&[], LunchStart).is_err());
        assert!(check_sequence(&[CheckIn], CheckIn).is_err());
        assert!(check_sequence(&[CheckIn], LunchEnd).is_err());
        assert!(check_sequence(&[CheckIn], CheckOut).is_ok());
        assert!(check_sequence(&[CheckIn, LunchStart], CheckOut).is_err());
        assert!(check_sequence(&[CheckIn, LunchStart, LunchEnd], CheckOut).is_ok());
        assert!(check_sequence(&[CheckIn, CheckOut], LunchStart).is_err());
    }

    fn record(record_type: RecordType, at: DateTime<Utc>, status: PunctualityStatus) -> TimeRecord {
        TimeRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            employee_name: "Alice".to_string(),
            department: None,
            record_type,
            timestamp: at,
            work_date: at.date_naive(),
            scheduled_at: at,
            minutes_diff: 0,
            status,
            note: None,
            created_at: at,
        }
    }

    #[test]
    fn test_summarize_day_subtracts_lunch() {
        use PunctualityStatus::*;
        let records = vec![
            record(RecordType::CheckIn, utc(2026, 10, 19, 9, 20), Late),
            record(RecordType::LunchStart, utc(2026, 10, 19, 12, 0), OnTime),
            record(RecordType::LunchEnd, utc(2026, 10, 19, 12, 45), OnTime),
            record(RecordType::CheckOut, utc(2026, 10, 19, 18, 40), Overtime),
        ];
        let refs: Vec<&TimeRecord> = records.iter().collect();
        let outcome = summarize_day(&refs);
        assert!(outcome.present && outcome.late && outcome.overtime && !outcome.early);
        assert_eq!(outcome.worked_minutes, Some(9 * 60 + 20 - 45));

        let partial = summarize_day(&refs[..1]);
        assert!(partial.present);
        assert_eq!(partial.worked_minutes, None);
    }
}
