//! XML namespaces the client speaks.

pub const JABBER_CLIENT: &str = "jabber:client";
pub const STREAMS: &str = "http://etherx.jabber.org/streams";
pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
pub const REGISTER: &str = "jabber:iq:register";
pub const AUTH: &str = "jabber:iq:auth";
pub const ROSTER: &str = "jabber:iq:roster";
pub const PRIVATE: &str = "jabber:iq:private";
pub const BOOKMARKS: &str = "storage:bookmarks";
pub const RECEIPTS: &str = "urn:xmpp:receipts";
pub const VERSION: &str = "jabber:iq:version";
pub const DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";
pub const DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";
pub const MUC: &str = "http://jabber.org/protocol/muc";
pub const CAPS: &str = "http://jabber.org/protocol/caps";
