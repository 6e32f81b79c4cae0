//! Built-in registry: one entry per destination table, in load order.
//!
//! Order matters. Referenced tables load before their referrers, and merged
//! tables list their legacy sources oldest first so newer data wins.

use super::{ColumnSpec, RowFilter, SourceColumn, SourceTable, TableGroup, TableSpec};
use crate::coerce::Coerce;

/// Default UTC offset in minutes for users and chats without one (UTC+8).
pub const DEFAULT_TIMEZONE: i64 = 480;

const EMPTY: Coerce = Coerce::Text { default: "" };
const FLAG: Coerce = Coerce::Bool { default: false };
const KEY_INT: Coerce = Coerce::IntOrNull;

/// All destination tables, in load order.
pub fn builtin() -> Vec<TableSpec> {
    vec![
        users(),
        prpr_caches(),
        chat_cfg(),
        chat_stat_daily(),
        character_attrs(),
        bili_inline_results(),
        saved_pics(),
        saved_pics_rating(),
        pic_rate_counter(),
        gemini_sessions(),
        gemini_contents(),
        yt_dl_results(),
        saved_msgs(),
        raw_update(),
        edit_history(),
    ]
}

fn users() -> TableSpec {
    TableSpec::new(
        "users",
        vec![
            ColumnSpec::new("id", Coerce::Int { default: 0 }),
            ColumnSpec::new("updated_at", Coerce::Timestamp),
            ColumnSpec::new("user_id", Coerce::Int { default: 0 }),
            ColumnSpec::new("first_name", EMPTY),
            ColumnSpec::keep("last_name"),
            ColumnSpec::new("profile_update_at", Coerce::Timestamp),
            ColumnSpec::keep("profile_photo"),
            ColumnSpec::new(
                "timezone",
                Coerce::Int {
                    default: DEFAULT_TIMEZONE,
                },
            ),
        ],
    )
    .source_column("timezone", SourceColumn::any(&["timezone", "time_zone"]))
    .filter(RowFilter::NonZero("user_id"))
    .identity("id")
}

fn prpr_caches() -> TableSpec {
    TableSpec::new(
        "prpr_caches",
        vec![
            ColumnSpec::keep("profile_photo_uid"),
            ColumnSpec::keep("prpr_file_id"),
        ],
    )
}

fn chat_cfg() -> TableSpec {
    let columns = vec![
        ColumnSpec::new("id", KEY_INT),
        ColumnSpec::new("web_id", Coerce::NullIfZero),
        ColumnSpec::new("auto_cvt_bili", FLAG),
        ColumnSpec::new("auto_ocr", FLAG),
        ColumnSpec::new("auto_calculate", FLAG),
        ColumnSpec::new("auto_exchange", FLAG),
        ColumnSpec::new("auto_check_adult", FLAG),
        ColumnSpec::new("save_messages", Coerce::Bool { default: true }),
        ColumnSpec::new("enable_coc", FLAG),
        ColumnSpec::new("resp_nsfw_msg", FLAG),
        ColumnSpec::new(
            "timezone",
            Coerce::Int {
                default: DEFAULT_TIMEZONE,
            },
        ),
    ];
    let group_infos = SourceTable {
        table: "group_infos",
        columns: vec![
            SourceColumn::named("group_id"),
            SourceColumn::named("group_web_id"),
            SourceColumn::named("auto_cvt_bili"),
            SourceColumn::named("auto_ocr"),
            SourceColumn::named("auto_calculate"),
            SourceColumn::named("auto_exchange"),
            SourceColumn::named("auto_check_adult"),
            SourceColumn::named("save_messages"),
            SourceColumn::named("co_c_enabled"),
            SourceColumn::named("resp_nsfw_msg"),
            SourceColumn::absent(),
        ],
    };
    let current = SourceTable::same_names("chat_cfg", &columns);
    TableSpec::new("chat_cfg", columns)
        .sources(vec![group_infos, current])
        .filter(RowFilter::NonNull("id"))
        .key(&["id"])
}

fn chat_stat_daily() -> TableSpec {
    TableSpec::new(
        "chat_stat_daily",
        vec![
            ColumnSpec::new("chat_id", KEY_INT),
            ColumnSpec::keep("stat_date"),
            ColumnSpec::keep("message_count"),
            ColumnSpec::keep("photo_count"),
            ColumnSpec::keep("video_count"),
            ColumnSpec::keep("sticker_count"),
            ColumnSpec::keep("forward_count"),
            ColumnSpec::keep("mars_count"),
            ColumnSpec::keep("max_mars_count"),
            ColumnSpec::keep("racy_count"),
            ColumnSpec::keep("adult_count"),
            ColumnSpec::keep("download_video_count"),
            ColumnSpec::keep("download_audio_count"),
            ColumnSpec::keep("dio_add_user_count"),
            ColumnSpec::keep("dio_ban_user_count"),
            ColumnSpec::keep("user_msg_stat"),
            ColumnSpec::keep("msg_count_by_time"),
            ColumnSpec::keep("msg_id_at_time_start"),
        ],
    )
    .filter(RowFilter::NonNull("chat_id"))
    .filter(RowFilter::NonNull("stat_date"))
    .key(&["chat_id", "stat_date"])
}

fn character_attrs() -> TableSpec {
    TableSpec::new(
        "character_attrs",
        vec![
            ColumnSpec::new("user_id", KEY_INT),
            ColumnSpec::keep("attr_name"),
            ColumnSpec::new("attr_value", EMPTY),
        ],
    )
    .filter(RowFilter::NonNull("user_id"))
    .filter(RowFilter::NonEmpty("attr_name"))
    .key(&["user_id", "attr_name"])
    .update_on_conflict(&["attr_value"])
}

fn bili_inline_results() -> TableSpec {
    TableSpec::new(
        "bili_inline_results",
        vec![
            ColumnSpec::keep("uid"),
            ColumnSpec::keep("text"),
            ColumnSpec::keep("chat_id"),
            ColumnSpec::keep("msg_id"),
        ],
    )
    .source_column("msg_id", SourceColumn::any(&["msg_id", "message"]))
    .identity("uid")
}

fn saved_pics() -> TableSpec {
    TableSpec::new(
        "saved_pics",
        vec![
            ColumnSpec::keep("file_uid"),
            ColumnSpec::keep("file_id"),
            ColumnSpec::keep("bot_rate"),
            ColumnSpec::keep("rand_key"),
            ColumnSpec::new("user_rating_sum", Coerce::Int { default: 0 }),
            ColumnSpec::new("rate_user_count", Coerce::Int { default: 0 }),
        ],
    )
    .key(&["file_uid"])
    .update_on_conflict(&["user_rating_sum", "rate_user_count"])
}

fn saved_pics_rating() -> TableSpec {
    TableSpec::new(
        "saved_pics_rating",
        vec![
            ColumnSpec::keep("file_uid"),
            ColumnSpec::new("user_id", KEY_INT),
            ColumnSpec::keep("rating"),
        ],
    )
    .filter(RowFilter::NonEmpty("file_uid"))
    .filter(RowFilter::NonNull("user_id"))
    .key(&["file_uid", "user_id"])
    .update_on_conflict(&["rating"])
}

fn pic_rate_counter() -> TableSpec {
    TableSpec::new(
        "pic_rate_counter",
        vec![
            ColumnSpec::new("rate", KEY_INT),
            ColumnSpec::new("count", Coerce::Int { default: 0 }),
        ],
    )
    .filter(RowFilter::NonNull("rate"))
    .key(&["rate"])
    .update_on_conflict(&["count"])
}

fn gemini_sessions() -> TableSpec {
    TableSpec::new(
        "gemini_sessions",
        vec![
            ColumnSpec::keep("id"),
            ColumnSpec::keep("chat_id"),
            ColumnSpec::keep("chat_name"),
            ColumnSpec::keep("chat_type"),
        ],
    )
    .identity("id")
}

fn gemini_contents() -> TableSpec {
    TableSpec::new(
        "gemini_contents",
        vec![
            ColumnSpec::keep("session_id"),
            ColumnSpec::keep("chat_id"),
            ColumnSpec::keep("msg_id"),
            ColumnSpec::keep("role"),
            ColumnSpec::new("sent_time", Coerce::Timestamp),
            ColumnSpec::keep("username"),
            ColumnSpec::keep("msg_type"),
            ColumnSpec::keep("reply_to_msg_id"),
            ColumnSpec::keep("text"),
            ColumnSpec::keep("blob"),
            ColumnSpec::keep("mime_type"),
            ColumnSpec::keep("quote_part"),
            ColumnSpec::keep("thought_signature"),
        ],
    )
}

fn yt_dl_results() -> TableSpec {
    let columns = vec![
        ColumnSpec::keep("url"),
        ColumnSpec::new("audio_only", FLAG),
        ColumnSpec::new("resolution", Coerce::Int { default: 0 }),
        ColumnSpec::new("file_id", EMPTY),
        ColumnSpec::new("title", EMPTY),
        ColumnSpec::new("description", EMPTY),
        ColumnSpec::new("uploader", EMPTY),
        ColumnSpec::new("upload_count", Coerce::Int { default: 1 }),
    ];
    let sources = vec![
        SourceTable::same_names("yt_dl_dbs", &columns),
        SourceTable::same_names("yt_dl_results", &columns),
    ];
    TableSpec::new("yt_dl_results", columns)
        .sources(sources)
        .filter(RowFilter::NonEmpty("url"))
        .key(&["url", "audio_only", "resolution"])
        .update_on_conflict(&["file_id", "title", "description", "uploader", "upload_count"])
}

fn saved_msgs() -> TableSpec {
    TableSpec::new(
        "saved_msgs",
        vec![
            ColumnSpec::new("message_id", KEY_INT),
            ColumnSpec::new("chat_id", KEY_INT),
            ColumnSpec::keep("from_user_id"),
            ColumnSpec::keep("sender_chat_id"),
            ColumnSpec::new("date", Coerce::Timestamp),
            ColumnSpec::keep("forward_origin_name"),
            ColumnSpec::keep("forward_origin_id"),
            ColumnSpec::keep("message_thread_id"),
            ColumnSpec::keep("reply_to_message_id"),
            ColumnSpec::keep("reply_to_chat_id"),
            ColumnSpec::keep("via_bot_id"),
            ColumnSpec::new("edit_date", Coerce::Timestamp),
            ColumnSpec::keep("media_group_id"),
            ColumnSpec::keep("text"),
            ColumnSpec::keep("entities_json"),
            ColumnSpec::keep("media_id"),
            ColumnSpec::keep("media_uid"),
            ColumnSpec::keep("media_type"),
            ColumnSpec::keep("extra_data"),
            ColumnSpec::keep("extra_type"),
        ],
    )
    // The oldest snapshots stored messages as (peer_id, from_id, msg_id, message).
    .source_column("message_id", SourceColumn::any(&["message_id", "msg_id"]))
    .source_column("chat_id", SourceColumn::any(&["chat_id", "peer_id"]))
    .source_column("from_user_id", SourceColumn::any(&["from_user_id", "from_id"]))
    .source_column("text", SourceColumn::any(&["text", "message"]))
    .filter(RowFilter::NonNull("message_id"))
    .filter(RowFilter::NonNull("chat_id"))
    .key(&["chat_id", "message_id"])
    .group(TableGroup::SavedMessages)
}

fn raw_update() -> TableSpec {
    TableSpec::new(
        "raw_update",
        vec![
            ColumnSpec::keep("id"),
            ColumnSpec::keep("chat_id"),
            ColumnSpec::keep("message_id"),
            ColumnSpec::keep("raw_update"),
        ],
    )
    .identity("id")
    .group(TableGroup::SavedMessages)
}

fn edit_history() -> TableSpec {
    TableSpec::new(
        "edit_history",
        vec![
            ColumnSpec::keep("chat_id"),
            ColumnSpec::keep("message_id"),
            ColumnSpec::keep("edit_id"),
            ColumnSpec::keep("text"),
        ],
    )
    .group(TableGroup::SavedMessages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{SourceRecord, SqlValue};
    use crate::merge::Merger;
    use crate::registry::ConflictPolicy;

    fn spec(name: &str) -> TableSpec {
        builtin().into_iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn test_load_order_starts_with_users() {
        let names: Vec<_> = builtin().iter().map(|s| s.name).collect();
        assert_eq!(names[0], "users");
        let sessions = names.iter().position(|n| *n == "gemini_sessions").unwrap();
        let contents = names.iter().position(|n| *n == "gemini_contents").unwrap();
        assert!(sessions < contents);
    }

    #[test]
    fn test_download_results_merge_oldest_first() {
        let yt = spec("yt_dl_results");
        let tables: Vec<_> = yt.sources.iter().map(|s| s.table).collect();
        assert_eq!(tables, vec!["yt_dl_dbs", "yt_dl_results"]);
        assert!(yt.is_merged());
    }

    #[test]
    fn test_rating_aggregates_overwrite_on_conflict() {
        assert_eq!(
            spec("saved_pics").on_conflict,
            ConflictPolicy::Update(vec!["user_rating_sum", "rate_user_count"])
        );
        assert_eq!(
            spec("pic_rate_counter").on_conflict,
            ConflictPolicy::Update(vec!["count"])
        );
        assert_eq!(spec("prpr_caches").on_conflict, ConflictPolicy::Ignore);
    }

    #[test]
    fn test_identity_columns() {
        let with_identity: Vec<_> = builtin()
            .into_iter()
            .filter_map(|s| s.identity.map(|c| (s.name, c)))
            .collect();
        assert_eq!(
            with_identity,
            vec![
                ("users", "id"),
                ("bili_inline_results", "uid"),
                ("gemini_sessions", "id"),
                ("raw_update", "id"),
            ]
        );
    }

    #[test]
    fn test_key_storage_class_does_not_split_merge_keys() {
        let attrs = spec("character_attrs");
        let record = |values: Vec<SqlValue>| {
            attrs
                .shape(SourceRecord::new(attrs.name, 3, values).unwrap())
                .unwrap()
        };
        let mut merger = Merger::new(&attrs.conflict_key);
        merger.push(record(vec![SqlValue::Int(5), "str".into(), "12".into()]));
        merger.push(record(vec!["5".into(), "str".into(), "15".into()]));

        let rows = merger.into_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("user_id"), Some(&SqlValue::Int(5)));
        assert_eq!(rows[0].get("attr_value"), Some(&SqlValue::Text("15".into())));
    }

    #[test]
    fn test_unparseable_integer_key_is_dropped() {
        let counter = spec("pic_rate_counter");
        let record = SourceRecord::new(counter.name, 2, vec!["n/a".into(), SqlValue::Int(3)]).unwrap();
        assert!(counter.shape(record).is_none());
    }

    #[test]
    fn test_chat_cfg_reads_legacy_group_infos() {
        let cfg = spec("chat_cfg");
        let legacy = &cfg.sources[0];
        assert_eq!(legacy.table, "group_infos");
        let enable_coc = cfg.columns.iter().position(|c| c.name == "enable_coc").unwrap();
        assert_eq!(legacy.columns[enable_coc], SourceColumn::named("co_c_enabled"));
        assert_eq!(legacy.columns.last(), Some(&SourceColumn::absent()));
    }
}
