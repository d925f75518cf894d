use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use journey_core::db::open_db_in_memory;
use journey_core::{
    ActivityType, CivilCalendar, ErrorKind, JourneyDraft, JourneyId, JourneyTimelineService,
    NewActivity, PlanSkeleton, TimelineServiceError,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn calendar() -> CivilCalendar {
    CivilCalendar::from_iana_name("Etc/GMT-7").unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
}

fn local(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    calendar()
        .combine(date(day), NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
        .with_timezone(&Utc)
}

fn draft(account_id: Uuid, first: u32, last: u32) -> JourneyDraft {
    JourneyDraft {
        account_id,
        title: "Coastal loop".to_string(),
        location: "Hoi An".to_string(),
        start: local(first, 8, 0),
        end: Some(local(last, 18, 0)),
        is_shared: true,
        is_completed: false,
    }
}

fn create_journey(service: &mut JourneyTimelineService<'_>, first: u32, last: u32) -> JourneyId {
    service
        .create_journey(&draft(Uuid::new_v4(), first, last))
        .unwrap()
}

#[test]
fn create_journey_materializes_one_day_per_civil_date() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 3);

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert_eq!(timeline.journey.title, "Coastal loop");
    assert!(timeline.journey.is_shared);
    let days: Vec<(NaiveDate, i64)> = timeline
        .days
        .iter()
        .map(|entry| (calendar().civil_date(entry.day.date), entry.day.day_number))
        .collect();
    assert_eq!(days, vec![(date(1), 1), (date(2), 2), (date(3), 3)]);
}

#[test]
fn create_journey_rejects_blank_title() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let mut input = draft(Uuid::new_v4(), 1, 2);
    input.title = "  ".to_string();

    let err = service.create_journey(&input).unwrap_err();
    assert!(matches!(err, TimelineServiceError::Validation(_)));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(service.list_journeys(input.account_id).unwrap().is_empty());
}

#[test]
fn add_day_appends_after_last_day_and_extends_window() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);

    let day_id = service.add_day(journey_id).unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    let last = &timeline.days[2];
    assert_eq!(last.day.id, day_id);
    assert_eq!(last.day.day_number, 3);
    assert_eq!(calendar().civil_date(last.day.date), date(3));
    assert_eq!(timeline.journey.end, Some(local(3, 18, 0)));
}

#[test]
fn add_day_on_journey_without_days_fails() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);
    service
        .materialize_plan(Some(journey_id), &PlanSkeleton::default(), None)
        .unwrap();

    let err = service.add_day(journey_id).unwrap_err();
    assert!(matches!(err, TimelineServiceError::NoAnchorDay(id) if id == journey_id));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(service.journey_timeline(journey_id).unwrap().days.is_empty());
}

#[test]
fn add_activity_lands_on_matching_day_with_next_position() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);

    let first = service
        .add_activity(journey_id, &NewActivity::new(Uuid::new_v4(), local(2, 9, 0), None))
        .unwrap();
    let mut second = NewActivity::new(Uuid::new_v4(), local(2, 7, 0), Some(local(2, 8, 0)));
    second.activity_type = ActivityType::Transport;
    let second = service.add_activity(journey_id, &second).unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert!(timeline.days[0].activities.is_empty());
    let activities = &timeline.days[1].activities;
    assert_eq!(activities[0].id, second);
    assert_eq!(activities[0].position, 1);
    assert_eq!(activities[0].activity_type, ActivityType::Transport);
    assert_eq!(activities[1].id, first);
    assert_eq!(activities[1].position, 0);
}

#[test]
fn add_activity_outside_journey_days_is_not_found() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);

    let err = service
        .add_activity(journey_id, &NewActivity::new(Uuid::new_v4(), local(9, 9, 0), None))
        .unwrap_err();
    match err {
        TimelineServiceError::DayNotFound {
            journey_id: reported,
            date: missing,
        } => {
            assert_eq!(reported, journey_id);
            assert_eq!(missing, date(9));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn add_activity_rejects_end_before_start() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);

    let err = service
        .add_activity(
            journey_id,
            &NewActivity::new(Uuid::new_v4(), local(1, 9, 0), Some(local(1, 8, 0))),
        )
        .unwrap_err();
    assert!(matches!(err, TimelineServiceError::InvalidTimeRange { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn remove_activity_drops_poi_from_every_day() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 3);
    let repeated = Uuid::new_v4();
    let kept = Uuid::new_v4();
    for day in [1, 3] {
        service
            .add_activity(journey_id, &NewActivity::new(repeated, local(day, 12, 0), None))
            .unwrap();
    }
    service
        .add_activity(journey_id, &NewActivity::new(kept, local(2, 12, 0), None))
        .unwrap();

    assert_eq!(service.remove_activity(journey_id, repeated).unwrap(), 2);
    assert_eq!(service.remove_activity(journey_id, repeated).unwrap(), 0);

    let timeline = service.journey_timeline(journey_id).unwrap();
    let remaining: Vec<Uuid> = timeline
        .days
        .iter()
        .flat_map(|entry| entry.activities.iter().map(|activity| activity.poi_id))
        .collect();
    assert_eq!(remaining, vec![kept]);
}

#[test]
fn update_selection_replaces_poi_and_times_on_same_date() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);
    let activity_id = service
        .add_activity(journey_id, &NewActivity::new(Uuid::new_v4(), local(1, 9, 0), None))
        .unwrap();

    let replacement = Uuid::new_v4();
    service
        .update_activity_selection(
            activity_id,
            replacement,
            local(1, 14, 0),
            Some(local(1, 16, 0)),
        )
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    let activity = &timeline.days[0].activities[0];
    assert_eq!(activity.poi_id, replacement);
    assert_eq!(activity.time, local(1, 14, 0));
    assert_eq!(activity.end_time, Some(local(1, 16, 0)));
}

#[test]
fn update_selection_rejects_moving_to_another_date() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 2);
    let original = Uuid::new_v4();
    let activity_id = service
        .add_activity(journey_id, &NewActivity::new(original, local(1, 9, 0), None))
        .unwrap();

    let err = service
        .update_activity_selection(activity_id, Uuid::new_v4(), local(2, 9, 0), None)
        .unwrap_err();
    match &err {
        TimelineServiceError::DayDateMismatch {
            day_date,
            requested,
            ..
        } => {
            assert_eq!(*day_date, date(1));
            assert_eq!(*requested, date(2));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert_eq!(timeline.days[0].activities[0].poi_id, original);
}

#[test]
fn update_selection_on_removed_activity_is_not_found() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let journey_id = create_journey(&mut service, 1, 1);
    let poi = Uuid::new_v4();
    let activity_id = service
        .add_activity(journey_id, &NewActivity::new(poi, local(1, 9, 0), None))
        .unwrap();
    service.remove_activity(journey_id, poi).unwrap();

    let err = service
        .update_activity_selection(activity_id, poi, local(1, 10, 0), None)
        .unwrap_err();
    assert!(matches!(err, TimelineServiceError::ActivityNotFound(id) if id == activity_id));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn list_and_delete_journeys_per_account() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let account = Uuid::new_v4();
    let later = service.create_journey(&draft(account, 10, 12)).unwrap();
    let earlier = service.create_journey(&draft(account, 1, 2)).unwrap();
    service
        .create_journey(&draft(Uuid::new_v4(), 1, 1))
        .unwrap();

    let listed: Vec<JourneyId> = service
        .list_journeys(account)
        .unwrap()
        .into_iter()
        .map(|journey| journey.id)
        .collect();
    assert_eq!(listed, vec![earlier, later]);

    service.delete_journey(earlier).unwrap();
    let listed: Vec<JourneyId> = service
        .list_journeys(account)
        .unwrap()
        .into_iter()
        .map(|journey| journey.id)
        .collect();
    assert_eq!(listed, vec![later]);

    let err = service.journey_timeline(earlier).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = service.delete_journey(earlier).unwrap_err();
    assert!(matches!(err, TimelineServiceError::JourneyNotFound(_)));
}

#[test]
fn service_requires_migrated_connection() {
    let mut conn = Connection::open_in_memory().unwrap();
    let err = JourneyTimelineService::try_new(&mut conn, calendar())
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Storage);
}
