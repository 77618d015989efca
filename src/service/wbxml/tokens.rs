//! MS-ASWBXML codepage and token tables
//!
//! Tag tokens are the low 6 bits; the tables below list them without the
//! content/attribute flags. Pages the command set never emits are still
//! registered by name so the decoder can report them precisely.

/// Codepage numbers per MS-ASWBXML §2.1.2
pub const PAGE_AIRSYNC: u8 = 0;
pub const PAGE_CONTACTS: u8 = 1;
pub const PAGE_EMAIL: u8 = 2;
pub const PAGE_AIRNOTIFY: u8 = 3;
pub const PAGE_CALENDAR: u8 = 4;
pub const PAGE_MOVE: u8 = 5;
pub const PAGE_GET_ITEM_ESTIMATE: u8 = 6;
pub const PAGE_FOLDER_HIERARCHY: u8 = 7;
pub const PAGE_MEETING_RESPONSE: u8 = 8;
pub const PAGE_TASKS: u8 = 9;
pub const PAGE_RESOLVE_RECIPIENTS: u8 = 10;
pub const PAGE_VALIDATE_CERT: u8 = 11;
pub const PAGE_CONTACTS2: u8 = 12;
pub const PAGE_PING: u8 = 13;
pub const PAGE_PROVISION: u8 = 14;
pub const PAGE_SEARCH: u8 = 15;
pub const PAGE_GAL: u8 = 16;
pub const PAGE_AIRSYNCBASE: u8 = 17;
pub const PAGE_SETTINGS: u8 = 18;
pub const PAGE_DOCUMENT_LIBRARY: u8 = 19;
pub const PAGE_ITEM_OPERATIONS: u8 = 20;
pub const PAGE_COMPOSE_MAIL: u8 = 21;
pub const PAGE_EMAIL2: u8 = 22;
pub const PAGE_NOTES: u8 = 23;
pub const PAGE_RIGHTS_MANAGEMENT: u8 = 24;

/// Highest registered codepage
pub const MAX_PAGE: u8 = PAGE_RIGHTS_MANAGEMENT;

static PAGE_NAMES: [&str; 25] = [
    "AirSync",
    "Contacts",
    "Email",
    "AirNotify",
    "Calendar",
    "Move",
    "GetItemEstimate",
    "FolderHierarchy",
    "MeetingResponse",
    "Tasks",
    "ResolveRecipients",
    "ValidateCert",
    "Contacts2",
    "Ping",
    "Provision",
    "Search",
    "GAL",
    "AirSyncBase",
    "Settings",
    "DocumentLibrary",
    "ItemOperations",
    "ComposeMail",
    "Email2",
    "Notes",
    "RightsManagement",
];

/// Whether a codepage number is part of the ActiveSync vocabulary
pub fn is_registered_page(page: u8) -> bool {
    page <= MAX_PAGE
}

/// Codepage display name
pub fn page_name(page: u8) -> Option<&'static str> {
    PAGE_NAMES.get(page as usize).copied()
}

/// AirSync (codepage 0)
pub mod airsync {
    pub const SYNC: u8 = 0x05;
    pub const RESPONSES: u8 = 0x06;
    pub const ADD: u8 = 0x07;
    pub const CHANGE: u8 = 0x08;
    pub const DELETE: u8 = 0x09;
    pub const FETCH: u8 = 0x0A;
    pub const SYNC_KEY: u8 = 0x0B;
    pub const CLIENT_ID: u8 = 0x0C;
    pub const SERVER_ID: u8 = 0x0D;
    pub const STATUS: u8 = 0x0E;
    pub const COLLECTION: u8 = 0x0F;
    pub const CLASS: u8 = 0x10;
    pub const COLLECTION_ID: u8 = 0x12;
    pub const GET_CHANGES: u8 = 0x13;
    pub const MORE_AVAILABLE: u8 = 0x14;
    pub const WINDOW_SIZE: u8 = 0x15;
    pub const COMMANDS: u8 = 0x16;
    pub const OPTIONS: u8 = 0x17;
    pub const FILTER_TYPE: u8 = 0x18;
    pub const TRUNCATION: u8 = 0x19;
    pub const CONFLICT: u8 = 0x1B;
    pub const COLLECTIONS: u8 = 0x1C;
    pub const APPLICATION_DATA: u8 = 0x1D;
    pub const DELETES_AS_MOVES: u8 = 0x1E;
    pub const SUPPORTED: u8 = 0x20;
    pub const SOFT_DELETE: u8 = 0x21;
    pub const MIME_SUPPORT: u8 = 0x22;
    pub const MIME_TRUNCATION: u8 = 0x23;
    pub const WAIT: u8 = 0x24;
    pub const LIMIT: u8 = 0x25;
    pub const PARTIAL: u8 = 0x26;
    pub const CONVERSATION_MODE: u8 = 0x27;
    pub const MAX_ITEMS: u8 = 0x28;
    pub const HEARTBEAT_INTERVAL: u8 = 0x29;
}

/// Email (codepage 2)
pub mod email {
    pub const ATTACHMENT: u8 = 0x05;
    pub const ATTACHMENTS: u8 = 0x06;
    pub const ATT_NAME: u8 = 0x07;
    pub const ATT_SIZE: u8 = 0x08;
    pub const ATT_OID: u8 = 0x09;
    pub const ATT_METHOD: u8 = 0x0A;
    pub const ATT_REMOVED: u8 = 0x0B;
    pub const BODY: u8 = 0x0C;
    pub const BODY_SIZE: u8 = 0x0D;
    pub const BODY_TRUNCATED: u8 = 0x0E;
    pub const DATE_RECEIVED: u8 = 0x0F;
    pub const DISPLAY_NAME: u8 = 0x10;
    pub const DISPLAY_TO: u8 = 0x11;
    pub const IMPORTANCE: u8 = 0x12;
    pub const MESSAGE_CLASS: u8 = 0x13;
    pub const SUBJECT: u8 = 0x14;
    pub const READ: u8 = 0x15;
    pub const TO: u8 = 0x16;
    pub const CC: u8 = 0x17;
    pub const FROM: u8 = 0x18;
    pub const REPLY_TO: u8 = 0x19;
    pub const ALL_DAY_EVENT: u8 = 0x1A;
    pub const CATEGORIES: u8 = 0x1B;
    pub const CATEGORY: u8 = 0x1C;
    pub const DT_STAMP: u8 = 0x1D;
    pub const END_TIME: u8 = 0x1E;
    pub const INSTANCE_TYPE: u8 = 0x1F;
    pub const BUSY_STATUS: u8 = 0x20;
    pub const LOCATION: u8 = 0x21;
    pub const MEETING_REQUEST: u8 = 0x22;
    pub const ORGANIZER: u8 = 0x23;
    pub const RECURRENCE_ID: u8 = 0x24;
    pub const REMINDER: u8 = 0x25;
    pub const RESPONSE_REQUESTED: u8 = 0x26;
    pub const RECURRENCES: u8 = 0x27;
    pub const RECURRENCE: u8 = 0x28;
    pub const RECURRENCE_TYPE: u8 = 0x29;
    pub const RECURRENCE_UNTIL: u8 = 0x2A;
    pub const RECURRENCE_OCCURRENCES: u8 = 0x2B;
    pub const RECURRENCE_INTERVAL: u8 = 0x2C;
    pub const RECURRENCE_DAY_OF_WEEK: u8 = 0x2D;
    pub const RECURRENCE_DAY_OF_MONTH: u8 = 0x2E;
    pub const RECURRENCE_WEEK_OF_MONTH: u8 = 0x2F;
    pub const RECURRENCE_MONTH_OF_YEAR: u8 = 0x30;
    pub const START_TIME: u8 = 0x31;
    pub const SENSITIVITY: u8 = 0x32;
    pub const TIME_ZONE: u8 = 0x33;
    pub const GLOBAL_OBJ_ID: u8 = 0x34;
    pub const THREAD_TOPIC: u8 = 0x35;
    pub const MIME_DATA: u8 = 0x36;
    pub const MIME_TRUNCATED: u8 = 0x37;
    pub const MIME_SIZE: u8 = 0x38;
    pub const INTERNET_CPID: u8 = 0x39;
    pub const FLAG: u8 = 0x3A;
    pub const FLAG_STATUS: u8 = 0x3B;
    pub const CONTENT_CLASS: u8 = 0x3C;
    pub const FLAG_TYPE: u8 = 0x3D;
    pub const COMPLETE_TIME: u8 = 0x3E;
    pub const DISALLOW_NEW_TIME_PROPOSAL: u8 = 0x3F;
}

/// GetItemEstimate (codepage 6)
pub mod estimate {
    pub const GET_ITEM_ESTIMATE: u8 = 0x05;
    pub const VERSION: u8 = 0x06;
    pub const COLLECTIONS: u8 = 0x07;
    pub const COLLECTION: u8 = 0x08;
    pub const CLASS: u8 = 0x09;
    pub const COLLECTION_ID: u8 = 0x0A;
    pub const DATE_TIME: u8 = 0x0B;
    pub const ESTIMATE: u8 = 0x0C;
    pub const RESPONSE: u8 = 0x0D;
    pub const STATUS: u8 = 0x0E;
}

/// FolderHierarchy (codepage 7)
pub mod folder_hierarchy {
    pub const FOLDERS: u8 = 0x05;
    pub const FOLDER: u8 = 0x06;
    pub const DISPLAY_NAME: u8 = 0x07;
    pub const SERVER_ID: u8 = 0x08;
    pub const PARENT_ID: u8 = 0x09;
    pub const TYPE: u8 = 0x0A;
    pub const RESPONSE: u8 = 0x0B;
    pub const STATUS: u8 = 0x0C;
    pub const CONTENT_CLASS: u8 = 0x0D;
    pub const CHANGES: u8 = 0x0E;
    pub const ADD: u8 = 0x0F;
    pub const DELETE: u8 = 0x10;
    pub const UPDATE: u8 = 0x11;
    pub const SYNC_KEY: u8 = 0x12;
    pub const FOLDER_CREATE: u8 = 0x13;
    pub const FOLDER_DELETE: u8 = 0x14;
    pub const FOLDER_UPDATE: u8 = 0x15;
    pub const FOLDER_SYNC: u8 = 0x16;
    pub const COUNT: u8 = 0x17;
}

/// Ping (codepage 13)
pub mod ping {
    pub const PING: u8 = 0x05;
    pub const AUTD_STATE: u8 = 0x06;
    pub const STATUS: u8 = 0x07;
    pub const HEARTBEAT_INTERVAL: u8 = 0x08;
    pub const FOLDERS: u8 = 0x09;
    pub const FOLDER: u8 = 0x0A;
    pub const ID: u8 = 0x0B;
    pub const CLASS: u8 = 0x0C;
    pub const MAX_FOLDERS: u8 = 0x0D;
}

/// Provision (codepage 14)
pub mod provision {
    pub const PROVISION: u8 = 0x05;
    pub const POLICIES: u8 = 0x06;
    pub const POLICY: u8 = 0x07;
    pub const POLICY_TYPE: u8 = 0x08;
    pub const POLICY_KEY: u8 = 0x09;
    pub const DATA: u8 = 0x0A;
    pub const STATUS: u8 = 0x0B;
    pub const REMOTE_WIPE: u8 = 0x0C;
    pub const EAS_PROVISION_DOC: u8 = 0x0D;
    pub const DEVICE_PASSWORD_ENABLED: u8 = 0x0E;
    pub const ALPHANUMERIC_DEVICE_PASSWORD_REQUIRED: u8 = 0x0F;
    pub const PASSWORD_RECOVERY_ENABLED: u8 = 0x11;
    pub const ATTACHMENTS_ENABLED: u8 = 0x13;
    pub const MIN_DEVICE_PASSWORD_LENGTH: u8 = 0x14;
    pub const MAX_INACTIVITY_TIME_DEVICE_LOCK: u8 = 0x15;
    pub const MAX_DEVICE_PASSWORD_FAILED_ATTEMPTS: u8 = 0x16;
    pub const MAX_ATTACHMENT_SIZE: u8 = 0x17;
    pub const ALLOW_SIMPLE_DEVICE_PASSWORD: u8 = 0x18;
    pub const DEVICE_PASSWORD_EXPIRATION: u8 = 0x19;
    pub const DEVICE_PASSWORD_HISTORY: u8 = 0x1A;
    pub const ALLOW_STORAGE_CARD: u8 = 0x1B;
    pub const ALLOW_CAMERA: u8 = 0x1C;
    pub const REQUIRE_DEVICE_ENCRYPTION: u8 = 0x1D;
    pub const ALLOW_UNSIGNED_APPLICATIONS: u8 = 0x1E;
    pub const ALLOW_UNSIGNED_INSTALLATION_PACKAGES: u8 = 0x1F;
    pub const MIN_DEVICE_PASSWORD_COMPLEX_CHARACTERS: u8 = 0x20;
    pub const ALLOW_WIFI: u8 = 0x21;
    pub const ALLOW_TEXT_MESSAGING: u8 = 0x22;
    pub const ALLOW_POP_IMAP_EMAIL: u8 = 0x23;
    pub const ALLOW_BLUETOOTH: u8 = 0x24;
    pub const ALLOW_IRDA: u8 = 0x25;
    pub const REQUIRE_MANUAL_SYNC_WHEN_ROAMING: u8 = 0x26;
    pub const ALLOW_DESKTOP_SYNC: u8 = 0x27;
    pub const MAX_CALENDAR_AGE_FILTER: u8 = 0x28;
    pub const ALLOW_HTML_EMAIL: u8 = 0x29;
    pub const MAX_EMAIL_AGE_FILTER: u8 = 0x2A;
    pub const MAX_EMAIL_BODY_TRUNCATION_SIZE: u8 = 0x2B;
    pub const MAX_EMAIL_HTML_BODY_TRUNCATION_SIZE: u8 = 0x2C;
    pub const REQUIRE_SIGNED_SMIME_MESSAGES: u8 = 0x2D;
    pub const REQUIRE_ENCRYPTED_SMIME_MESSAGES: u8 = 0x2E;
    pub const REQUIRE_SIGNED_SMIME_ALGORITHM: u8 = 0x2F;
    pub const REQUIRE_ENCRYPTION_SMIME_ALGORITHM: u8 = 0x30;
    pub const ALLOW_SMIME_ENCRYPTION_NEGOTIATION: u8 = 0x31;
    pub const ALLOW_SMIME_SOFT_CERTS: u8 = 0x32;
    pub const ALLOW_BROWSER: u8 = 0x33;
    pub const ALLOW_CONSUMER_EMAIL: u8 = 0x34;
    pub const ALLOW_REMOTE_DESKTOP: u8 = 0x35;
    pub const ALLOW_INTERNET_SHARING: u8 = 0x36;
    pub const UNAPPROVED_IN_ROM_APPLICATION_LIST: u8 = 0x37;
    pub const APPLICATION_NAME: u8 = 0x38;
    pub const APPROVED_APPLICATION_LIST: u8 = 0x39;
    pub const HASH: u8 = 0x3A;
}

/// GAL (codepage 16)
pub mod gal {
    pub const DISPLAY_NAME: u8 = 0x05;
    pub const PHONE: u8 = 0x06;
    pub const OFFICE: u8 = 0x07;
    pub const TITLE: u8 = 0x08;
    pub const COMPANY: u8 = 0x09;
    pub const ALIAS: u8 = 0x0A;
    pub const FIRST_NAME: u8 = 0x0B;
    pub const LAST_NAME: u8 = 0x0C;
    pub const HOME_PHONE: u8 = 0x0D;
    pub const MOBILE_PHONE: u8 = 0x0E;
    pub const EMAIL_ADDRESS: u8 = 0x0F;
    pub const PICTURE: u8 = 0x10;
    pub const STATUS: u8 = 0x11;
    pub const DATA: u8 = 0x12;
}

/// AirSyncBase (codepage 17)
pub mod airsyncbase {
    pub const BODY_PREFERENCE: u8 = 0x05;
    pub const TYPE: u8 = 0x06;
    pub const TRUNCATION_SIZE: u8 = 0x07;
    pub const ALL_OR_NONE: u8 = 0x08;
    pub const BODY: u8 = 0x0A;
    pub const DATA: u8 = 0x0B;
    pub const ESTIMATED_DATA_SIZE: u8 = 0x0C;
    pub const TRUNCATED: u8 = 0x0D;
    pub const ATTACHMENTS: u8 = 0x0E;
    pub const ATTACHMENT: u8 = 0x0F;
    pub const DISPLAY_NAME: u8 = 0x10;
    pub const FILE_REFERENCE: u8 = 0x11;
    pub const METHOD: u8 = 0x12;
    pub const CONTENT_ID: u8 = 0x13;
    pub const CONTENT_LOCATION: u8 = 0x14;
    pub const IS_INLINE: u8 = 0x15;
    pub const NATIVE_BODY_TYPE: u8 = 0x16;
    pub const CONTENT_TYPE: u8 = 0x17;
    pub const PREVIEW: u8 = 0x18;
    pub const BODY_PART_PREFERENCE: u8 = 0x19;
    pub const BODY_PART: u8 = 0x1A;
    pub const STATUS: u8 = 0x1B;
}

/// ItemOperations (codepage 20)
pub mod item_operations {
    pub const ITEM_OPERATIONS: u8 = 0x05;
    pub const FETCH: u8 = 0x06;
    pub const STORE: u8 = 0x07;
    pub const OPTIONS: u8 = 0x08;
    pub const RANGE: u8 = 0x09;
    pub const TOTAL: u8 = 0x0A;
    pub const PROPERTIES: u8 = 0x0B;
    pub const DATA: u8 = 0x0C;
    pub const STATUS: u8 = 0x0D;
    pub const RESPONSE: u8 = 0x0E;
    pub const VERSION: u8 = 0x0F;
    pub const SCHEMA: u8 = 0x10;
    pub const PART: u8 = 0x11;
    pub const EMPTY_FOLDER_CONTENTS: u8 = 0x12;
    pub const DELETE_SUB_FOLDERS: u8 = 0x13;
    pub const USER_NAME: u8 = 0x14;
    pub const PASSWORD: u8 = 0x15;
    pub const MOVE: u8 = 0x16;
    pub const DST_FLD_ID: u8 = 0x17;
    pub const CONVERSATION_ID: u8 = 0x18;
    pub const MOVE_ALWAYS: u8 = 0x19;
}

static AIRSYNC_NAMES: &[(u8, &str)] = &[
    (0x05, "Sync"),
    (0x06, "Responses"),
    (0x07, "Add"),
    (0x08, "Change"),
    (0x09, "Delete"),
    (0x0A, "Fetch"),
    (0x0B, "SyncKey"),
    (0x0C, "ClientId"),
    (0x0D, "ServerId"),
    (0x0E, "Status"),
    (0x0F, "Collection"),
    (0x10, "Class"),
    (0x12, "CollectionId"),
    (0x13, "GetChanges"),
    (0x14, "MoreAvailable"),
    (0x15, "WindowSize"),
    (0x16, "Commands"),
    (0x17, "Options"),
    (0x18, "FilterType"),
    (0x19, "Truncation"),
    (0x1B, "Conflict"),
    (0x1C, "Collections"),
    (0x1D, "ApplicationData"),
    (0x1E, "DeletesAsMoves"),
    (0x20, "Supported"),
    (0x21, "SoftDelete"),
    (0x22, "MIMESupport"),
    (0x23, "MIMETruncation"),
    (0x24, "Wait"),
    (0x25, "Limit"),
    (0x26, "Partial"),
    (0x27, "ConversationMode"),
    (0x28, "MaxItems"),
    (0x29, "HeartbeatInterval"),
];

static EMAIL_NAMES: &[(u8, &str)] = &[
    (0x05, "Attachment"),
    (0x06, "Attachments"),
    (0x07, "AttName"),
    (0x08, "AttSize"),
    (0x09, "AttOid"),
    (0x0A, "AttMethod"),
    (0x0B, "AttRemoved"),
    (0x0C, "Body"),
    (0x0D, "BodySize"),
    (0x0E, "BodyTruncated"),
    (0x0F, "DateReceived"),
    (0x10, "DisplayName"),
    (0x11, "DisplayTo"),
    (0x12, "Importance"),
    (0x13, "MessageClass"),
    (0x14, "Subject"),
    (0x15, "Read"),
    (0x16, "To"),
    (0x17, "Cc"),
    (0x18, "From"),
    (0x19, "ReplyTo"),
    (0x1D, "DtStamp"),
    (0x35, "ThreadTopic"),
    (0x36, "MIMEData"),
    (0x37, "MIMETruncated"),
    (0x38, "MIMESize"),
    (0x39, "InternetCPID"),
    (0x3A, "Flag"),
    (0x3B, "FlagStatus"),
    (0x3C, "ContentClass"),
    (0x3D, "FlagType"),
    (0x3E, "CompleteTime"),
    (0x3F, "DisallowNewTimeProposal"),
];

static ESTIMATE_NAMES: &[(u8, &str)] = &[
    (0x05, "GetItemEstimate"),
    (0x06, "Version"),
    (0x07, "Collections"),
    (0x08, "Collection"),
    (0x09, "Class"),
    (0x0A, "CollectionId"),
    (0x0B, "DateTime"),
    (0x0C, "Estimate"),
    (0x0D, "Response"),
    (0x0E, "Status"),
];

static FOLDER_HIERARCHY_NAMES: &[(u8, &str)] = &[
    (0x05, "Folders"),
    (0x06, "Folder"),
    (0x07, "DisplayName"),
    (0x08, "ServerId"),
    (0x09, "ParentId"),
    (0x0A, "Type"),
    (0x0B, "Response"),
    (0x0C, "Status"),
    (0x0D, "ContentClass"),
    (0x0E, "Changes"),
    (0x0F, "Add"),
    (0x10, "Delete"),
    (0x11, "Update"),
    (0x12, "SyncKey"),
    (0x13, "FolderCreate"),
    (0x14, "FolderDelete"),
    (0x15, "FolderUpdate"),
    (0x16, "FolderSync"),
    (0x17, "Count"),
];

static PING_NAMES: &[(u8, &str)] = &[
    (0x05, "Ping"),
    (0x06, "AutdState"),
    (0x07, "Status"),
    (0x08, "HeartbeatInterval"),
    (0x09, "Folders"),
    (0x0A, "Folder"),
    (0x0B, "Id"),
    (0x0C, "Class"),
    (0x0D, "MaxFolders"),
];

static PROVISION_NAMES: &[(u8, &str)] = &[
    (0x05, "Provision"),
    (0x06, "Policies"),
    (0x07, "Policy"),
    (0x08, "PolicyType"),
    (0x09, "PolicyKey"),
    (0x0A, "Data"),
    (0x0B, "Status"),
    (0x0C, "RemoteWipe"),
    (0x0D, "EASProvisionDoc"),
    (0x0E, "DevicePasswordEnabled"),
    (0x0F, "AlphanumericDevicePasswordRequired"),
    (0x11, "PasswordRecoveryEnabled"),
    (0x13, "AttachmentsEnabled"),
    (0x14, "MinDevicePasswordLength"),
    (0x15, "MaxInactivityTimeDeviceLock"),
    (0x16, "MaxDevicePasswordFailedAttempts"),
    (0x17, "MaxAttachmentSize"),
    (0x18, "AllowSimpleDevicePassword"),
    (0x19, "DevicePasswordExpiration"),
    (0x1A, "DevicePasswordHistory"),
    (0x1B, "AllowStorageCard"),
    (0x1C, "AllowCamera"),
    (0x1D, "RequireDeviceEncryption"),
    (0x1E, "AllowUnsignedApplications"),
    (0x1F, "AllowUnsignedInstallationPackages"),
    (0x20, "MinDevicePasswordComplexCharacters"),
    (0x21, "AllowWiFi"),
    (0x22, "AllowTextMessaging"),
    (0x23, "AllowPOPIMAPEmail"),
    (0x24, "AllowBluetooth"),
    (0x25, "AllowIrDA"),
    (0x26, "RequireManualSyncWhenRoaming"),
    (0x27, "AllowDesktopSync"),
    (0x28, "MaxCalendarAgeFilter"),
    (0x29, "AllowHTMLEmail"),
    (0x2A, "MaxEmailAgeFilter"),
    (0x2B, "MaxEmailBodyTruncationSize"),
    (0x2C, "MaxEmailHTMLBodyTruncationSize"),
    (0x2D, "RequireSignedSMIMEMessages"),
    (0x2E, "RequireEncryptedSMIMEMessages"),
    (0x2F, "RequireSignedSMIMEAlgorithm"),
    (0x30, "RequireEncryptionSMIMEAlgorithm"),
    (0x31, "AllowSMIMEEncryptionAlgorithmNegotiation"),
    (0x32, "AllowSMIMESoftCerts"),
    (0x33, "AllowBrowser"),
    (0x34, "AllowConsumerEmail"),
    (0x35, "AllowRemoteDesktop"),
    (0x36, "AllowInternetSharing"),
    (0x37, "UnapprovedInROMApplicationList"),
    (0x38, "ApplicationName"),
    (0x39, "ApprovedApplicationList"),
    (0x3A, "Hash"),
];

static GAL_NAMES: &[(u8, &str)] = &[
    (0x05, "DisplayName"),
    (0x06, "Phone"),
    (0x07, "Office"),
    (0x08, "Title"),
    (0x09, "Company"),
    (0x0A, "Alias"),
    (0x0B, "FirstName"),
    (0x0C, "LastName"),
    (0x0D, "HomePhone"),
    (0x0E, "MobilePhone"),
    (0x0F, "EmailAddress"),
    (0x10, "Picture"),
    (0x11, "Status"),
    (0x12, "Data"),
];

static AIRSYNCBASE_NAMES: &[(u8, &str)] = &[
    (0x05, "BodyPreference"),
    (0x06, "Type"),
    (0x07, "TruncationSize"),
    (0x08, "AllOrNone"),
    (0x0A, "Body"),
    (0x0B, "Data"),
    (0x0C, "EstimatedDataSize"),
    (0x0D, "Truncated"),
    (0x0E, "Attachments"),
    (0x0F, "Attachment"),
    (0x10, "DisplayName"),
    (0x11, "FileReference"),
    (0x12, "Method"),
    (0x13, "ContentId"),
    (0x14, "ContentLocation"),
    (0x15, "IsInline"),
    (0x16, "NativeBodyType"),
    (0x17, "ContentType"),
    (0x18, "Preview"),
    (0x19, "BodyPartPreference"),
    (0x1A, "BodyPart"),
    (0x1B, "Status"),
];

static ITEM_OPERATIONS_NAMES: &[(u8, &str)] = &[
    (0x05, "ItemOperations"),
    (0x06, "Fetch"),
    (0x07, "Store"),
    (0x08, "Options"),
    (0x09, "Range"),
    (0x0A, "Total"),
    (0x0B, "Properties"),
    (0x0C, "Data"),
    (0x0D, "Status"),
    (0x0E, "Response"),
    (0x0F, "Version"),
    (0x10, "Schema"),
    (0x11, "Part"),
    (0x12, "EmptyFolderContents"),
    (0x13, "DeleteSubFolders"),
    (0x14, "UserName"),
    (0x15, "Password"),
    (0x16, "Move"),
    (0x17, "DstFldId"),
    (0x18, "ConversationId"),
    (0x19, "MoveAlways"),
];

fn names_for_page(page: u8) -> Option<&'static [(u8, &'static str)]> {
    match page {
        PAGE_AIRSYNC => Some(AIRSYNC_NAMES),
        PAGE_EMAIL => Some(EMAIL_NAMES),
        PAGE_GET_ITEM_ESTIMATE => Some(ESTIMATE_NAMES),
        PAGE_FOLDER_HIERARCHY => Some(FOLDER_HIERARCHY_NAMES),
        PAGE_PING => Some(PING_NAMES),
        PAGE_PROVISION => Some(PROVISION_NAMES),
        PAGE_GAL => Some(GAL_NAMES),
        PAGE_AIRSYNCBASE => Some(AIRSYNCBASE_NAMES),
        PAGE_ITEM_OPERATIONS => Some(ITEM_OPERATIONS_NAMES),
        _ => None,
    }
}

/// Display name for a tag token (without flag bits) on a codepage
pub fn token_name(page: u8, token: u8) -> Option<&'static str> {
    names_for_page(page)?
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, name)| *name)
}

/// Token for an element name on a codepage
pub fn token_by_name(page: u8, name: &str) -> Option<u8> {
    names_for_page(page)?
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(t, _)| *t)
}
