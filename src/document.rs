//! Exercise document model: page and tool collections, ordering and option editing.
//!
//! Every mutation is refused while the exercise is locked. `index` fields are recomputed
//! from position after each insert, delete or move, so `items[i].index == i` always holds.

use tracing::debug;

use crate::config::AuthoringDefaults;
use crate::domain::{AssetId, Exercise, Page, Tool, ToolKind, ToolType};
use crate::error::{EngineError, Result};
use crate::util::{taken_names, unique_name};

/// Minimum number of options a choice tool keeps.
pub const MIN_OPTIONS: usize = 2;

pub trait Indexed {
    fn set_index(&mut self, index: usize);
}

impl Indexed for Page {
    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

impl Indexed for Tool {
    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

pub fn reindex<T: Indexed>(items: &mut [T]) {
    for (i, item) in items.iter_mut().enumerate() {
        item.set_index(i);
    }
}

/// Move `items[from]` so it ends up at position `to`, then recompute every index.
pub fn move_item<T: Indexed>(items: &mut Vec<T>, from: usize, to: usize) -> Option<()> {
    if from >= items.len() || to >= items.len() {
        return None;
    }
    let item = items.remove(from);
    items.insert(to, item);
    reindex(items);
    Some(())
}

/// Partial update of a page's scalar fields.
#[derive(Clone, Debug, Default)]
pub struct PagePatch {
    pub display_text: Option<String>,
    pub timer_seconds: Option<u32>,
    pub extraction_prompt: Option<String>,
}

/// One editable tool field with its new value.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolField {
    PlaceholderText(String),
    Options(Vec<String>),
    ChatBotInstructions(String),
    MaxChatCount(Option<u32>),
}

impl ToolField {
    fn name(&self) -> &'static str {
        match self {
            ToolField::PlaceholderText(_) => "placeholderText",
            ToolField::Options(_) => "options",
            ToolField::ChatBotInstructions(_) => "chatBotInstructions",
            ToolField::MaxChatCount(_) => "maxChatCount",
        }
    }
}

/// Type-appropriate defaults for a freshly added tool.
pub fn default_kind(tool_type: ToolType, defaults: &AuthoringDefaults) -> ToolKind {
    match tool_type {
        ToolType::Text => ToolKind::Text,
        ToolType::Journal => ToolKind::Journal,
        ToolType::Rating => ToolKind::Rating,
        ToolType::McqSingle => ToolKind::McqSingle { options: defaults.mcq_options.to_vec() },
        ToolType::McqMultiselect => ToolKind::McqMultiselect { options: defaults.mcq_options.to_vec() },
        ToolType::ChatBot => ToolKind::ChatBot {
            chat_bot_instructions: defaults.chat_bot_instructions.clone(),
            max_chat_count: None,
        },
        ToolType::FileUpload => ToolKind::FileUpload,
        ToolType::Audio => ToolKind::Audio,
        ToolType::Video => ToolKind::Video,
    }
}

impl Exercise {
    pub fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked {
            debug!(target: "exercise", id = ?self.id, "Refusing mutation of locked exercise");
            return Err(EngineError::ExerciseLocked);
        }
        Ok(())
    }

    fn page_mut(&mut self, page: usize) -> Result<&mut Page> {
        self.pages.get_mut(page).ok_or(EngineError::NoSuchPage(page))
    }

    fn tool_mut(&mut self, page: usize, tool: usize) -> Result<&mut Tool> {
        self.page_mut(page)?
            .tools
            .get_mut(tool)
            .ok_or(EngineError::NoSuchTool { page, tool })
    }

    /// Append an empty page; returns its index.
    pub fn add_page(&mut self) -> Result<usize> {
        self.ensure_unlocked()?;
        let index = self.pages.len();
        self.pages.push(Page::empty(index));
        Ok(index)
    }

    pub fn delete_page(&mut self, page: usize) -> Result<Page> {
        self.ensure_unlocked()?;
        if page >= self.pages.len() {
            return Err(EngineError::NoSuchPage(page));
        }
        if self.pages.len() == 1 {
            return Err(EngineError::LastPage);
        }
        let removed = self.pages.remove(page);
        reindex(&mut self.pages);
        Ok(removed)
    }

    pub fn update_page(&mut self, page: usize, patch: PagePatch) -> Result<()> {
        self.ensure_unlocked()?;
        let p = self.page_mut(page)?;
        if let Some(text) = patch.display_text {
            p.display_text = text;
        }
        if let Some(secs) = patch.timer_seconds {
            p.timer_seconds = secs;
        }
        if let Some(prompt) = patch.extraction_prompt {
            p.extraction_prompt = prompt;
        }
        Ok(())
    }

    /// Append a tool with a name unique across the whole exercise; returns that name.
    pub fn add_tool(&mut self, page: usize, tool_type: ToolType, defaults: &AuthoringDefaults) -> Result<String> {
        self.ensure_unlocked()?;
        if page >= self.pages.len() {
            return Err(EngineError::NoSuchPage(page));
        }
        let name = unique_name(tool_type, &taken_names(self));
        let tools = &mut self.pages[page].tools;
        let index = tools.len();
        tools.push(Tool {
            index,
            unique_name: name.clone(),
            placeholder_text: String::new(),
            kind: default_kind(tool_type, defaults),
        });
        debug!(target: "exercise", page, %tool_type, unique_name = %name, "Tool added");
        Ok(name)
    }

    pub fn delete_tool(&mut self, page: usize, tool: usize) -> Result<Tool> {
        self.ensure_unlocked()?;
        let tools = &mut self.page_mut(page)?.tools;
        if tool >= tools.len() {
            return Err(EngineError::NoSuchTool { page, tool });
        }
        let removed = tools.remove(tool);
        reindex(tools);
        Ok(removed)
    }

    pub fn update_tool(&mut self, page: usize, tool: usize, field: ToolField) -> Result<()> {
        self.ensure_unlocked()?;
        let t = self.tool_mut(page, tool)?;
        let label = t.kind.label();
        let mismatch = EngineError::FieldMismatch { field: field.name(), tool_type: label.to_string() };
        match field {
            ToolField::PlaceholderText(text) => t.placeholder_text = text,
            ToolField::Options(new_options) => {
                let Some(options) = t.kind.options_mut() else {
                    return Err(mismatch);
                };
                if new_options.len() < MIN_OPTIONS {
                    return Err(EngineError::TooFewOptions);
                }
                *options = new_options;
            }
            ToolField::ChatBotInstructions(text) => match &mut t.kind {
                ToolKind::ChatBot { chat_bot_instructions, .. } => *chat_bot_instructions = text,
                _ => return Err(mismatch),
            },
            ToolField::MaxChatCount(max) => match &mut t.kind {
                ToolKind::ChatBot { max_chat_count, .. } => *max_chat_count = max,
                _ => return Err(mismatch),
            },
        }
        Ok(())
    }

    /// Page-local move of one tool; indices of that page are recomputed.
    pub fn reorder_tools(&mut self, page: usize, from: usize, to: usize) -> Result<()> {
        self.ensure_unlocked()?;
        let tools = &mut self.page_mut(page)?.tools;
        let bad = from.max(to);
        move_item(tools, from, to).ok_or(EngineError::NoSuchTool { page, tool: bad })
    }

    fn options_mut(&mut self, page: usize, tool: usize) -> Result<&mut Vec<String>> {
        let t = self.tool_mut(page, tool)?;
        let label = t.kind.label();
        t.kind.options_mut().ok_or(EngineError::FieldMismatch {
            field: "options",
            tool_type: label.to_string(),
        })
    }

    pub fn add_option(&mut self, page: usize, tool: usize, option: String) -> Result<usize> {
        self.ensure_unlocked()?;
        let options = self.options_mut(page, tool)?;
        options.push(option);
        Ok(options.len() - 1)
    }

    pub fn update_option(&mut self, page: usize, tool: usize, option: usize, text: String) -> Result<()> {
        self.ensure_unlocked()?;
        let options = self.options_mut(page, tool)?;
        let slot = options.get_mut(option).ok_or(EngineError::NoSuchOption(option))?;
        *slot = text;
        Ok(())
    }

    pub fn remove_option(&mut self, page: usize, tool: usize, option: usize) -> Result<String> {
        self.ensure_unlocked()?;
        let options = self.options_mut(page, tool)?;
        if option >= options.len() {
            return Err(EngineError::NoSuchOption(option));
        }
        if options.len() <= MIN_OPTIONS {
            return Err(EngineError::TooFewOptions);
        }
        Ok(options.remove(option))
    }

    /// Attach an uploaded image with its (optional) description, keeping both lists parallel.
    pub fn add_display_image(&mut self, page: usize, asset: AssetId, description: Option<String>) -> Result<usize> {
        self.ensure_unlocked()?;
        let p = self.page_mut(page)?;
        p.display_image_descriptions.resize(p.display_images.len(), None);
        p.display_images.push(asset);
        p.display_image_descriptions.push(description);
        Ok(p.display_images.len() - 1)
    }

    pub fn remove_display_image(&mut self, page: usize, image: usize) -> Result<AssetId> {
        self.ensure_unlocked()?;
        let p = self.page_mut(page)?;
        if image >= p.display_images.len() {
            return Err(EngineError::NotFound(format!("display image {image} on page {page}")));
        }
        if image < p.display_image_descriptions.len() {
            p.display_image_descriptions.remove(image);
        }
        Ok(p.display_images.remove(image))
    }

    pub fn add_file(&mut self, page: usize, asset: AssetId) -> Result<usize> {
        self.ensure_unlocked()?;
        let p = self.page_mut(page)?;
        p.files.push(asset);
        Ok(p.files.len() - 1)
    }

    pub fn remove_file(&mut self, page: usize, file: usize) -> Result<AssetId> {
        self.ensure_unlocked()?;
        let p = self.page_mut(page)?;
        if file >= p.files.len() {
            return Err(EngineError::NotFound(format!("file {file} on page {page}")));
        }
        Ok(p.files.remove(file))
    }

    /// Restore structural invariants on a document received from elsewhere.
    pub fn normalize(&mut self) {
        if self.pages.is_empty() {
            self.pages.push(Page::empty(0));
        }
        reindex(&mut self.pages);
        for page in &mut self.pages {
            reindex(&mut page.tools);
            page.display_image_descriptions.resize(page.display_images.len(), None);
        }
    }
}
