use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use journey_core::db::open_db_in_memory;
use journey_core::{
    ActivityType, CivilCalendar, ErrorKind, JourneyDraft, JourneyTimeline,
    JourneyTimelineService, PlanActivityBlock, PlanDayBlock, PlanSkeleton, TimelineServiceError,
};
use rusqlite::Connection;
use uuid::Uuid;

fn setup() -> Connection {
    open_db_in_memory().unwrap()
}

fn calendar() -> CivilCalendar {
    CivilCalendar::from_iana_name("Etc/GMT-7").unwrap()
}

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

fn local(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    calendar()
        .combine(
            date(month, day),
            NaiveTime::from_hms_opt(hour, minute, 0).unwrap(),
        )
        .with_timezone(&Utc)
}

fn draft(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> JourneyDraft {
    JourneyDraft {
        account_id: Uuid::new_v4(),
        title: "Mekong delta".to_string(),
        location: "Can Tho".to_string(),
        start,
        end,
        is_shared: false,
        is_completed: false,
    }
}

fn block(poi_id: &str, start: Option<&str>, end: Option<&str>) -> PlanActivityBlock {
    PlanActivityBlock {
        poi_id: poi_id.to_string(),
        start_time: start.map(str::to_string),
        end_time: end.map(str::to_string),
        ..PlanActivityBlock::default()
    }
}

fn skeleton(days: Vec<Vec<PlanActivityBlock>>) -> PlanSkeleton {
    PlanSkeleton {
        days: days
            .into_iter()
            .map(|activities| PlanDayBlock { activities })
            .collect(),
    }
}

/// Timeline content without row identities.
fn content(timeline: &JourneyTimeline) -> Vec<(NaiveDate, i64, Vec<String>)> {
    let calendar = calendar();
    timeline
        .days
        .iter()
        .map(|entry| {
            let activities = entry
                .activities
                .iter()
                .map(|activity| {
                    format!(
                        "{}|{}|{:?}|{:?}|{:?}|{}",
                        activity.poi_id,
                        activity.time,
                        activity.end_time,
                        activity.activity_type,
                        activity.notes,
                        activity.position
                    )
                })
                .collect();
            (calendar.civil_date(entry.day.date), entry.day.day_number, activities)
        })
        .collect()
}

#[test]
fn end_before_start_crosses_midnight() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let poi = Uuid::new_v4().to_string();
    let plan = skeleton(vec![
        vec![block(&poi, Some("09:00"), Some("08:00"))],
        vec![],
    ]);

    let journey_id = service
        .materialize_plan(None, &plan, Some(&draft(local(3, 1, 7, 0), None)))
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert_eq!(timeline.days.len(), 2);
    let activity = &timeline.days[0].activities[0];
    assert_eq!(activity.time, local(3, 1, 9, 0));
    assert_eq!(activity.end_time, Some(local(3, 2, 8, 0)));
}

#[test]
fn blank_poi_block_is_skipped_and_siblings_survive() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let first = Uuid::new_v4();
    let last = Uuid::new_v4();
    let plan = skeleton(vec![vec![
        block(&first.to_string(), Some("08:00"), None),
        block("", Some("10:00"), None),
        block("not-a-uuid", Some("11:00"), None),
        block(&last.to_string(), Some("12:00"), Some("13:00")),
    ]]);

    let journey_id = service
        .materialize_plan(None, &plan, Some(&draft(local(3, 1, 0, 0), None)))
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    let activities = &timeline.days[0].activities;
    assert_eq!(activities.len(), 2);
    assert_eq!(activities[0].poi_id, first);
    assert_eq!(activities[1].poi_id, last);
    assert_eq!(
        activities.iter().map(|a| a.position).collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn days_land_on_consecutive_dates_with_dense_numbers() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let plan = skeleton(vec![vec![], vec![], vec![]]);

    let journey_id = service
        .materialize_plan(None, &plan, Some(&draft(local(2, 27, 15, 45), None)))
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    let summary: Vec<(NaiveDate, i64)> = content(&timeline)
        .into_iter()
        .map(|(day, number, _)| (day, number))
        .collect();
    assert_eq!(
        summary,
        vec![(date(2, 27), 1), (date(2, 28), 2), (date(3, 1), 3)]
    );
    // Derived end keeps the start clock on the last civil day.
    assert_eq!(timeline.journey.end, Some(local(3, 1, 15, 45)));
}

#[test]
fn tolerated_defects_fall_back_to_midnight_and_place() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let poi = Uuid::new_v4();
    let mut garbled = block(&poi.to_string(), Some("quarter past"), Some("??"));
    garbled.activity_type = Some("spaceship".to_string());
    let mut dinner = block(&poi.to_string(), Some("7:30 PM"), None);
    dinner.activity_type = Some(" FOOD ".to_string());
    dinner.notes = Some("  pho  ".to_string());

    let journey_id = service
        .materialize_plan(
            None,
            &skeleton(vec![vec![garbled, dinner]]),
            Some(&draft(local(3, 1, 9, 0), None)),
        )
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    let activities = &timeline.days[0].activities;
    assert_eq!(activities[0].time, local(3, 1, 0, 0));
    assert_eq!(activities[0].end_time, None);
    assert_eq!(activities[0].activity_type, ActivityType::Place);
    assert_eq!(activities[1].time, local(3, 1, 19, 30));
    assert_eq!(activities[1].activity_type, ActivityType::Food);
    assert_eq!(activities[1].notes.as_deref(), Some("pho"));
}

#[test]
fn repeated_materialization_converges_on_same_content() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let plan = skeleton(vec![
        vec![
            block(&Uuid::new_v4().to_string(), Some("08:00"), Some("09:30")),
            block(&Uuid::new_v4().to_string(), Some("22:00"), Some("01:00")),
        ],
        vec![block(&Uuid::new_v4().to_string(), None, None)],
    ]);

    let journey_id = service
        .materialize_plan(None, &plan, Some(&draft(local(4, 10, 6, 0), None)))
        .unwrap();
    let first = service.journey_timeline(journey_id).unwrap();

    let again = service
        .materialize_plan(Some(journey_id), &plan, None)
        .unwrap();
    assert_eq!(again, journey_id);
    let second = service.journey_timeline(journey_id).unwrap();

    assert_eq!(content(&first), content(&second));
    assert_ne!(first.days[0].day.id, second.days[0].day.id);
}

#[test]
fn rematerializing_replaces_the_whole_subtree() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let old_poi = Uuid::new_v4();
    let journey_id = service
        .materialize_plan(
            None,
            &skeleton(vec![
                vec![block(&old_poi.to_string(), Some("09:00"), None)],
                vec![],
                vec![],
            ]),
            Some(&draft(local(5, 1, 0, 0), None)),
        )
        .unwrap();

    let new_poi = Uuid::new_v4();
    service
        .materialize_plan(
            Some(journey_id),
            &skeleton(vec![vec![block(&new_poi.to_string(), Some("10:00"), None)]]),
            None,
        )
        .unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert_eq!(timeline.days.len(), 1);
    assert_eq!(timeline.days[0].activities.len(), 1);
    assert_eq!(timeline.days[0].activities[0].poi_id, new_poi);
    assert_eq!(timeline.journey.end, Some(timeline.journey.start));
}

#[test]
fn missing_journey_and_draft_is_a_precondition_failure() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();

    let err = service
        .materialize_plan(None, &skeleton(vec![vec![]]), None)
        .unwrap_err();
    assert!(matches!(err, TimelineServiceError::MissingCreationInput));
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn unknown_journey_id_is_not_found() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();

    let err = service
        .materialize_plan(Some(Uuid::new_v4()), &skeleton(vec![vec![]]), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn storage_failure_rolls_back_and_keeps_prior_subtree() {
    let mut conn = setup();
    let doomed_poi = Uuid::new_v4();
    let (journey_id, before) = {
        let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
        let journey_id = service
            .materialize_plan(
                None,
                &skeleton(vec![
                    vec![block(&Uuid::new_v4().to_string(), Some("09:00"), None)],
                    vec![],
                ]),
                Some(&draft(local(6, 1, 0, 0), None)),
            )
            .unwrap();
        (journey_id, service.journey_timeline(journey_id).unwrap())
    };

    conn.execute_batch(&format!(
        "CREATE TRIGGER reject_doomed_poi
         BEFORE INSERT ON journey_activities
         WHEN NEW.poi_uuid = '{doomed_poi}'
         BEGIN
             SELECT RAISE(ABORT, 'rejected poi');
         END;"
    ))
    .unwrap();

    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let err = service
        .materialize_plan(
            Some(journey_id),
            &skeleton(vec![
                vec![block(&Uuid::new_v4().to_string(), Some("07:00"), None)],
                vec![block(&doomed_poi.to_string(), Some("08:00"), None)],
                vec![],
            ]),
            None,
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Storage);
    // Trigger aborts surface as constraint failures, which retrying cannot fix.
    assert!(!err.is_retryable());
    assert_eq!(service.journey_timeline(journey_id).unwrap(), before);
}

#[test]
fn planner_json_output_materializes_end_to_end() {
    let mut conn = setup();
    let mut service = JourneyTimelineService::try_new(&mut conn, calendar()).unwrap();
    let poi = Uuid::new_v4();
    let plan: PlanSkeleton = serde_json::from_value(serde_json::json!({
        "days": [
            { "activities": [
                { "poi_id": poi.to_string(), "start_time": "06:30", "end_time": "08:00",
                  "activity_type": "transport" },
                { "poi_id": "   " }
            ] },
            {}
        ]
    }))
    .unwrap();
    let draft: JourneyDraft = serde_json::from_value(serde_json::json!({
        "account_id": Uuid::new_v4(),
        "title": "Northern loop",
        "start": local(8, 20, 5, 0),
    }))
    .unwrap();

    let journey_id = service.materialize_plan(None, &plan, Some(&draft)).unwrap();

    let timeline = service.journey_timeline(journey_id).unwrap();
    assert_eq!(timeline.days.len(), 2);
    assert!(timeline.days[1].activities.is_empty());
    let activity = &timeline.days[0].activities[0];
    assert_eq!(activity.activity_type, ActivityType::Transport);
    assert_eq!(activity.time, local(8, 20, 6, 30));
    assert_eq!(activity.end_time, Some(local(8, 20, 8, 0)));
    assert_eq!(timeline.days[0].activities.len(), 1);
}
