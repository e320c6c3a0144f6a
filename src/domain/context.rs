// ==========================================
// 教会行政数据交换系统 - 校验上下文
// ==========================================
// 职责: 单次管道调用内只读的参考数据快照
// 约束: 每次调用只加载一次，全部行共享同一快照
// ==========================================

use crate::domain::record_type::RecordType;
use crate::domain::schema::ReferenceTarget;
use crate::domain::value::Record;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 参考目录项（职分/部门等种子数据）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: String,
    pub name: String,
}

/// 名称解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(String),
    NotFound,
    /// 同名实体不止一个
    Ambiguous(usize),
}

/// 名称 → ID 列表索引（名称忽略大小写与首尾空白）
#[derive(Debug, Clone, Default)]
struct NameIndex {
    by_name: HashMap<String, Vec<String>>,
}

impl NameIndex {
    fn insert(&mut self, name: &str, id: &str) {
        let key = normalize(name);
        if key.is_empty() {
            return;
        }
        let ids = self.by_name.entry(key).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&normalize(name))
    }

    fn resolve(&self, name: &str) -> Resolution {
        match self.by_name.get(&normalize(name)) {
            None => Resolution::NotFound,
            Some(ids) if ids.len() == 1 => Resolution::Found(ids[0].clone()),
            Some(ids) if ids.is_empty() => Resolution::NotFound,
            Some(ids) => Resolution::Ambiguous(ids.len()),
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 已有成员的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
}

/// 已有组织节点的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSnapshot {
    pub id: String,
    pub code: String,
    pub name: String,
}

/// 校验上下文
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    members: NameIndex,
    member_emails: HashMap<String, String>,
    positions: NameIndex,
    departments: NameIndex,
    organizations: NameIndex,
    organization_codes: HashMap<String, String>,
}

impl ValidationContext {
    pub fn new(
        members: Vec<MemberSnapshot>,
        positions: Vec<ReferenceEntry>,
        departments: Vec<ReferenceEntry>,
        organizations: Vec<OrganizationSnapshot>,
    ) -> Self {
        let mut ctx = ValidationContext::default();
        for member in &members {
            ctx.add_member(member);
        }
        for position in &positions {
            ctx.positions.insert(&position.name, &position.id);
        }
        for department in &departments {
            ctx.departments.insert(&department.name, &department.id);
        }
        for org in &organizations {
            ctx.add_organization(org);
        }
        ctx
    }

    fn add_member(&mut self, member: &MemberSnapshot) {
        self.members.insert(&member.name, &member.id);
        if let Some(email) = member.email.as_deref() {
            let key = normalize(email);
            if !key.is_empty() {
                self.member_emails.insert(key, member.id.clone());
            }
        }
    }

    fn add_organization(&mut self, org: &OrganizationSnapshot) {
        self.organizations.insert(&org.name, &org.id);
        let key = normalize(&org.code);
        if !key.is_empty() {
            self.organization_codes.insert(key, org.id.clone());
        }
    }

    /// 按名称解析引用
    pub fn resolve(&self, target: ReferenceTarget, name: &str) -> Resolution {
        match target {
            ReferenceTarget::Member => self.members.resolve(name),
            ReferenceTarget::Position => self.positions.resolve(name),
            ReferenceTarget::Department => self.departments.resolve(name),
            ReferenceTarget::Organization => self.organizations.resolve(name),
        }
    }

    /// 已有记录中是否存在该唯一键，存在则返回其 ID
    pub fn existing_unique(&self, record_type: RecordType, field: &str, value: &str) -> Option<&str> {
        let key = normalize(value);
        match (record_type, field) {
            (RecordType::Member, "email") => self.member_emails.get(&key).map(String::as_str),
            (RecordType::OrganizationNode, "code") => {
                self.organization_codes.get(&key).map(String::as_str)
            }
            _ => None,
        }
    }

    /// 已有记录中是否存在同名实体
    pub fn name_exists(&self, record_type: RecordType, name: &str) -> bool {
        match record_type {
            RecordType::Member => self.members.contains(name),
            RecordType::OrganizationNode => self.organizations.contains(name),
            _ => false,
        }
    }

    /// 叠加尚未落库的候选记录（恢复预览时用于模拟前序工作表已写入）
    ///
    /// 与已有实体同名或同邮箱/编码的候选视为对已有记录的更新，不重复加入。
    pub fn overlay_pending(&mut self, record_type: RecordType, records: &[(String, Record)]) {
        for (pending_id, record) in records {
            let name = record
                .get("name")
                .and_then(|v| v.as_text())
                .unwrap_or_default()
                .to_string();
            match record_type {
                RecordType::Member => {
                    let email = record
                        .get("email")
                        .and_then(|v| v.as_text())
                        .map(str::to_string);
                    let email_known = email
                        .as_deref()
                        .map(|e| self.member_emails.contains_key(&normalize(e)))
                        .unwrap_or(false);
                    if email_known || self.members.contains(&name) {
                        continue;
                    }
                    self.add_member(&MemberSnapshot {
                        id: pending_id.clone(),
                        name,
                        email,
                    });
                }
                RecordType::OrganizationNode => {
                    let code = record
                        .get("code")
                        .and_then(|v| v.as_text())
                        .unwrap_or_default()
                        .to_string();
                    if self.organization_codes.contains_key(&normalize(&code))
                        || self.organizations.contains(&name)
                    {
                        continue;
                    }
                    self.add_organization(&OrganizationSnapshot {
                        id: pending_id.clone(),
                        code,
                        name,
                    });
                }
                _ => {}
            }
        }
    }
}
