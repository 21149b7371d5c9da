#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use uuid::Uuid;

    use crate::{
        BackupPolicy, Describe, DurationConverter, FloatKey, Mapped, Rule, config_enum, lens,
    };

    // -- Enums -----------------------------------------------------------------

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Color {
        Red,
        Green,
        Blue,
    }

    config_enum!(Color {
        Red => "RED",
        Green => "GREEN",
        Blue => "BLUE",
    });

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum Difficulty {
        Easy,
        #[default]
        Normal,
        Hard,
    }

    config_enum!(Difficulty {
        Easy => "EASY",
        Normal => "NORMAL",
        Hard => "HARD",
    });

    // -- A typical server config: scalars, nesting, a map, a legacy path --------

    #[derive(Debug, Clone, PartialEq)]
    pub struct ServerConfig {
        pub motd: String,
        pub max_players: u32,
        pub difficulty: Difficulty,
        pub whitelist: Vec<String>,
        pub database: Database,
        pub limits: BTreeMap<String, i64>,
        pub session_token: String,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                motd: "A figmap server".into(),
                max_players: 20,
                difficulty: Difficulty::Normal,
                whitelist: vec!["admin".into()],
                database: Database::default(),
                limits: BTreeMap::from([("chat".to_string(), 3)]),
                session_token: String::new(),
            }
        }
    }

    impl Mapped for ServerConfig {
        fn describe(d: &mut Describe<Self>) {
            d.version(3).header(["Server settings"]);
            d.value("motd", lens!(motd))
                .path("display.motd")
                .legacy_path("message-of-the-day");
            d.value("maxPlayers", lens!(max_players))
                .comment("Players allowed at once.")
                .validate(Rule::range(0.0, 100.0));
            d.enumeration("difficulty", lens!(difficulty));
            d.list("whitelist", lens!(whitelist));
            d.nested("database", lens!(database))
                .comment("Database settings.");
            d.map("limits", lens!(limits));
            d.value("session_token", lens!(session_token)).ignore();
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Database {
        pub url: Option<String>,
        pub pool_size: u32,
    }

    impl Default for Database {
        fn default() -> Self {
            Self {
                url: None,
                pool_size: 5,
            }
        }
    }

    impl Mapped for Database {
        fn describe(d: &mut Describe<Self>) {
            d.value("url", lens!(url));
            d.value("pool_size", lens!(pool_size));
        }
    }

    // -- Collections of every shape ---------------------------------------------

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Inventory {
        pub counts: Vec<i64>,
        pub notes: Vec<Option<String>>,
        pub palette: Vec<Color>,
        pub extras: Vec<toml::Table>,
        pub slots: Vec<Slot>,
        pub kits: BTreeMap<String, Kit>,
        pub by_slot: BTreeMap<i32, i64>,
        pub colors: BTreeMap<String, Color>,
    }

    impl Mapped for Inventory {
        fn describe(d: &mut Describe<Self>) {
            d.list("counts", lens!(counts)).validate(Rule::new().min(0.0));
            d.list("notes", lens!(notes));
            d.enum_list("palette", lens!(palette));
            d.table_list("extras", lens!(extras));
            d.object_list("slots", lens!(slots));
            d.object_map("kits", lens!(kits));
            d.map("by_slot", lens!(by_slot));
            d.enum_map("colors", lens!(colors));
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Slot {
        pub item: String,
        pub amount: u32,
    }

    impl Default for Slot {
        fn default() -> Self {
            Self {
                item: "air".into(),
                amount: 1,
            }
        }
    }

    impl Mapped for Slot {
        fn describe(d: &mut Describe<Self>) {
            d.value("item", lens!(item));
            d.value("amount", lens!(amount)).validate(Rule::range(1.0, 64.0));
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Kit {
        pub slots: u32,
        pub hook_fired: bool,
    }

    impl Mapped for Kit {
        fn describe(d: &mut Describe<Self>) {
            d.value("slots", lens!(slots));
            d.post_load("mark", |kit| {
                kit.hook_fired = true;
                Ok(())
            });
        }
    }

    /// Maps keyed by every non-string key type.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Keyed {
        pub by_weight: BTreeMap<FloatKey, String>,
        pub owners: BTreeMap<Uuid, String>,
        pub tiers: BTreeMap<Color, i64>,
        pub levels: BTreeMap<i64, Difficulty>,
    }

    impl Mapped for Keyed {
        fn describe(d: &mut Describe<Self>) {
            d.map("by_weight", lens!(by_weight));
            d.map("owners", lens!(owners));
            d.map("tiers", lens!(tiers));
            d.enum_map("levels", lens!(levels));
        }
    }

    // -- Converters, validation rules, hooks -------------------------------------

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Location {
        pub x: i32,
        pub y: i32,
        pub z: i32,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct Player {
        pub name: String,
        pub cooldown: Duration,
        pub spawn: Location,
        pub home: Option<Database>,
        /// Not declared: derived by the post-load hook.
        pub display_name: String,
    }

    impl Default for Player {
        fn default() -> Self {
            Self {
                name: "player".into(),
                cooldown: Duration::from_secs(30),
                spawn: Location { x: 0, y: 64, z: 0 },
                home: None,
                display_name: String::new(),
            }
        }
    }

    impl Mapped for Player {
        fn describe(d: &mut Describe<Self>) {
            d.value("name", lens!(name))
                .validate(Rule::new().not_null().pattern("[A-Za-z0-9_]+"));
            d.converted("cooldown", lens!(cooldown), DurationConverter);
            d.serde("spawn", lens!(spawn));
            d.optional_nested("home", lens!(home));
            d.post_load("display-name", |player| {
                player.display_name = player.name.to_uppercase();
                Ok(())
            });
        }
    }

    // -- Versioned, backed-up document for the file lifecycle -------------------

    #[derive(Debug, Clone, PartialEq)]
    pub struct AppConfig {
        pub port: u16,
        pub host: String,
        pub reloads: u32,
    }

    impl Default for AppConfig {
        fn default() -> Self {
            Self {
                port: 8080,
                host: "localhost".into(),
                reloads: 0,
            }
        }
    }

    impl Mapped for AppConfig {
        fn describe(d: &mut Describe<Self>) {
            d.version(2).backup(BackupPolicy::default());
            d.value("port", lens!(port)).comment("The port number.");
            d.value("host", lens!(host)).comment("The application host.");
            d.on_reload("count", |config| {
                config.reloads += 1;
                Ok(())
            });
        }
    }

    #[test]
    fn fixtures_describe_cleanly() {
        assert_eq!(crate::resolve::<ServerConfig>().attributes().len(), 7);
        assert_eq!(crate::resolve::<Inventory>().attributes().len(), 8);
        assert_eq!(crate::resolve::<Player>().attributes().len(), 4);
        assert_eq!(crate::resolve::<AppConfig>().version(), Some(2));

        let key_types: Vec<_> = crate::resolve::<Keyed>()
            .attributes()
            .iter()
            .map(|a| a.key_type())
            .collect();
        assert_eq!(
            key_types,
            [Some("f64"), Some("uuid"), Some("Color"), Some("i64")]
        );
    }
}
