use eventboard_core::{Event, EventField, EventValidationError, FieldErrorKind, Recurrence};
use uuid::Uuid;

#[test]
fn event_new_sets_defaults() {
    let event = Event::new("Meetup", 1_700_000_000_000, "Boston");

    assert!(!event.id.is_nil());
    assert_eq!(event.title, "Meetup");
    assert_eq!(event.date, Some(1_700_000_000_000));
    assert_eq!(event.location, "Boston");
    assert_eq!(event.description, None);
    assert_eq!(event.recurrence, Recurrence::Special);
    assert!(!event.geocoded());
    assert_eq!(event.lat_lng_pair(), None);
    event.validate().unwrap();
}

#[test]
fn valid_iff_title_date_and_location_are_present() {
    let titles = ["Meetup", "", "  "];
    let dates = [Some(0), None];
    let locations = ["Boston", "", "\t"];

    for title in titles {
        for date in dates {
            for location in locations {
                let mut event = Event::new(title, 0, location);
                event.date = date;

                let expected_valid =
                    !title.trim().is_empty() && date.is_some() && !location.trim().is_empty();
                assert_eq!(
                    event.validate().is_ok(),
                    expected_valid,
                    "title={title:?} date={date:?} location={location:?}"
                );
            }
        }
    }
}

#[test]
fn coordinates_are_set_and_cleared_as_a_pair() {
    let mut event = Event::new("Meetup", 0, "Boston, MA, 02114");

    event.set_coordinates(42.356004, -71.061619);
    assert!(event.geocoded());
    assert_eq!(event.lat_lng_pair(), Some([42.356004, -71.061619]));

    event.clear_coordinates();
    assert!(!event.geocoded());
    assert_eq!(event.lat(), None);
    assert_eq!(event.lng(), None);
}

#[test]
fn with_id_rejects_nil_uuid() {
    let err = Event::with_id(Uuid::nil(), "Meetup", 0, "Boston").unwrap_err();
    assert_eq!(err.errors().len(), 1);
    assert_eq!(err.errors()[0].field, EventField::Id);
    assert_eq!(err.errors()[0].kind, FieldErrorKind::Nil);
}

#[test]
fn validation_error_message_lists_every_field() {
    let mut event = Event::new("", 0, "");
    event.date = None;

    let err: EventValidationError = event.validate().unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid event: title can't be blank; date can't be blank; location can't be blank"
    );
}

#[test]
fn event_serialization_uses_expected_wire_fields() {
    let id = Uuid::parse_str("11111111-2222-4333-8444-555555555555").unwrap();
    let mut event = Event::with_id(id, "Gala", 1_700_000_000_000, "Boston, MA, 02114")
        .unwrap()
        .with_description("Black *tie*")
        .with_recurrence(Recurrence::Recurring);
    event.set_coordinates(42.356004, -71.061619);

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["title"], "Gala");
    assert_eq!(json["date"], 1_700_000_000_000_i64);
    assert_eq!(json["recurrence"], "recurring");
    assert_eq!(json["lat"], 42.356004);
    assert_eq!(json["lng"], -71.061619);

    let decoded: Event = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, event);
}

#[test]
fn deserialize_rejects_partial_coordinates() {
    let value = serde_json::json!({
        "id": "11111111-2222-4333-8444-555555555555",
        "title": "half",
        "date": 1,
        "location": "Boston",
        "lat": 42.0,
        "lng": null
    });

    let err = serde_json::from_value::<Event>(value).unwrap_err();
    assert!(
        err.to_string().contains("must be both set or both null"),
        "unexpected error: {err}"
    );
}
