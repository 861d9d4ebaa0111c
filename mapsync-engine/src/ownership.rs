//! 归属标记：区分本脚本生成的实体与用户手工绘制的内容。
//!
//! 标记以脚本标识为 APPID 写入 XData，值为同一标识字符串；
//! 另外写一条 `mapsync://<标识>` 超链接，方便在 CAD 中直接看到。

use std::fmt;

use mapsync_core::document::{BlockDefinition, Document, Entity, XDataValue};
use tracing::{debug, warn};

use crate::errors::TagError;

/// 超链接形式的次级标记前缀。
pub const MARKER_SCHEME: &str = "mapsync://";

/// 已校验的脚本标识，作为 XData 应用名与标记值。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnershipTag(String);

impl OwnershipTag {
    pub fn new(script_id: &str) -> Result<Self, TagError> {
        let id = script_id.trim();
        let valid = !id.is_empty()
            && id.len() <= 31
            && id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !valid {
            return Err(TagError::InvalidId(script_id.to_string()));
        }
        Ok(Self(id.to_ascii_uppercase()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn marker(&self) -> String {
        format!("{MARKER_SCHEME}{}", self.0)
    }

    /// 在文档 APPID 表中登记标识，写入 XData 前必须完成。
    pub fn register(&self, document: &mut Document) {
        if document.register_app_id(&self.0) {
            debug!(app = %self.0, "已注册归属标记 APPID");
        }
    }
}

impl fmt::Display for OwnershipTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 可携带归属标记的对象。
///
/// `get_tag` 用 `Ok(None)` 表示没有标记，`Err` 只用于标记存在但格式错误。
pub trait Tagged {
    fn get_tag(&self, app: &str) -> Result<Option<String>, TagError>;
    fn set_tag(&mut self, app: &str, value: &str) -> Result<(), TagError>;
    fn clear_tag(&mut self, app: &str) -> bool;

    fn secondary_marker(&self) -> Option<&str> {
        None
    }

    fn set_secondary_marker(&mut self, _marker: &str) -> Result<(), TagError> {
        Ok(())
    }

    fn clear_secondary_marker(&mut self) -> bool {
        false
    }
}

fn read_tag(app: &str, values: Option<&[XDataValue]>) -> Result<Option<String>, TagError> {
    match values {
        None => Ok(None),
        Some([XDataValue::String(value), ..]) => Ok(Some(value.clone())),
        Some([]) => Err(TagError::Malformed {
            app: app.to_string(),
            reason: "empty xdata group".to_string(),
        }),
        Some([other, ..]) => Err(TagError::Malformed {
            app: app.to_string(),
            reason: format!("expected a string value, found group code {}", other.group_code()),
        }),
    }
}

impl Tagged for Entity {
    fn get_tag(&self, app: &str) -> Result<Option<String>, TagError> {
        read_tag(app, self.xdata(app))
    }

    fn set_tag(&mut self, app: &str, value: &str) -> Result<(), TagError> {
        self.set_xdata(app, vec![XDataValue::String(value.to_string())])?;
        Ok(())
    }

    fn clear_tag(&mut self, app: &str) -> bool {
        self.discard_xdata(app)
    }

    fn secondary_marker(&self) -> Option<&str> {
        self.hyperlink()
    }

    fn set_secondary_marker(&mut self, marker: &str) -> Result<(), TagError> {
        self.set_hyperlink(marker)?;
        Ok(())
    }

    fn clear_secondary_marker(&mut self) -> bool {
        self.clear_hyperlink()
    }
}

impl Tagged for BlockDefinition {
    fn get_tag(&self, app: &str) -> Result<Option<String>, TagError> {
        read_tag(app, self.xdata.get(app))
    }

    fn set_tag(&mut self, app: &str, value: &str) -> Result<(), TagError> {
        self.xdata
            .set(app, vec![XDataValue::String(value.to_string())])?;
        Ok(())
    }

    fn clear_tag(&mut self, app: &str) -> bool {
        self.xdata.discard(app)
    }
}

/// 写入归属标记。已带相同标记时不做任何事；次级标记写入失败只记录日志。
pub fn attach<T: Tagged + ?Sized>(target: &mut T, tag: &OwnershipTag) -> Result<(), TagError> {
    match target.get_tag(tag.as_str()) {
        Ok(Some(existing)) if existing == tag.as_str() => return Ok(()),
        Ok(_) => {}
        Err(err) => debug!(error = %err, "覆盖格式错误的归属标记"),
    }
    target.set_tag(tag.as_str(), tag.as_str())?;
    if let Err(err) = target.set_secondary_marker(&tag.marker()) {
        warn!(tag = %tag, error = %err, "写入超链接标记失败");
    }
    Ok(())
}

/// 判断对象是否归本脚本所有。格式错误的标记记录告警并视为不归属。
pub fn is_owned<T: Tagged + ?Sized>(target: &T, tag: &OwnershipTag) -> bool {
    match target.get_tag(tag.as_str()) {
        Ok(Some(value)) => value == tag.as_str(),
        Ok(None) => false,
        Err(err) => {
            warn!(tag = %tag, error = %err, "归属标记格式错误，按非本脚本对象处理");
            false
        }
    }
}

/// 移除归属标记与次级标记（仅当次级标记是本脚本写入的）。返回是否移除了标记。
pub fn release<T: Tagged + ?Sized>(target: &mut T, tag: &OwnershipTag) -> bool {
    let removed = target.clear_tag(tag.as_str());
    if target.secondary_marker() == Some(tag.marker().as_str()) {
        target.clear_secondary_marker();
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapsync_core::document::{EntityKind, Point};
    use mapsync_core::geometry::Point2;

    fn point_entity() -> Entity {
        Entity::new(
            "Roads",
            EntityKind::Point(Point {
                location: Point2::new(1.0, 2.0),
            }),
        )
    }

    #[test]
    fn tag_ids_are_validated_and_normalized() {
        assert_eq!(OwnershipTag::new(" sys ").unwrap().as_str(), "SYS");
        assert!(OwnershipTag::new("").is_err());
        assert!(OwnershipTag::new("has space").is_err());
    }

    #[test]
    fn attach_writes_tag_and_marker() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let mut entity = point_entity();
        assert!(!is_owned(&entity, &tag));

        attach(&mut entity, &tag).unwrap();
        assert!(is_owned(&entity, &tag));
        assert_eq!(entity.hyperlink(), Some("mapsync://SYS"));
    }

    #[test]
    fn attach_is_idempotent() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let mut entity = point_entity();
        attach(&mut entity, &tag).unwrap();
        let before = entity.clone();
        attach(&mut entity, &tag).unwrap();
        assert_eq!(entity, before);
    }

    #[test]
    fn other_scripts_tags_do_not_count() {
        let mine = OwnershipTag::new("SYS").unwrap();
        let theirs = OwnershipTag::new("OTHER").unwrap();
        let mut entity = point_entity();
        attach(&mut entity, &theirs).unwrap();
        assert!(!is_owned(&entity, &mine));
    }

    #[test]
    fn malformed_tag_is_an_error_not_absence() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let mut entity = point_entity();
        entity.set_xdata("SYS", vec![XDataValue::Integer(1)]).unwrap();
        assert!(matches!(
            entity.get_tag("SYS"),
            Err(TagError::Malformed { .. })
        ));
        assert!(!is_owned(&entity, &tag));
    }

    #[test]
    fn release_keeps_foreign_hyperlinks() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let mut entity = point_entity();
        attach(&mut entity, &tag).unwrap();
        entity.set_hyperlink("https://example.org").unwrap();
        assert!(release(&mut entity, &tag));
        assert!(!is_owned(&entity, &tag));
        assert_eq!(entity.hyperlink(), Some("https://example.org"));
    }

    #[test]
    fn blocks_carry_tags_in_xdata() {
        let tag = OwnershipTag::new("SYS").unwrap();
        let mut block = BlockDefinition::new("LEGEND", Point2::new(0.0, 0.0));
        attach(&mut block, &tag).unwrap();
        assert!(is_owned(&block, &tag));
        assert!(block.secondary_marker().is_none());
    }
}
