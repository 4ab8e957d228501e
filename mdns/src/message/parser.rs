use super::header::*;
use super::name::*;
use super::question::*;
use super::resource::*;
use super::*;
use shared::error::*;

// A Parser allows incrementally parsing a DNS message.
//
// The section methods must be called in the order of the sections on the
// wire: questions, answers, authorities, additionals. Each returns
// ErrSectionDone once its section is exhausted, which also advances the
// cursor to the next section.
#[derive(Default)]
pub(crate) struct Parser<'a> {
    msg: &'a [u8],
    header: HeaderInternal,
    section: Section,
    off: usize,
    index: usize,
    res_header_valid: bool,
    res_header: ResourceHeader,
}

impl<'a> Parser<'a> {
    // start parses the header and enables the parsing of questions.
    pub(crate) fn start(&mut self, msg: &'a [u8]) -> Result<Header> {
        *self = Parser {
            msg,
            ..Default::default()
        };
        self.off = self.header.unpack(msg, 0)?;
        self.section = Section::Questions;
        Ok(self.header.header())
    }

    fn check_advance(&mut self, sec: Section) -> Result<()> {
        if self.section < sec {
            return Err(Error::ErrNotStarted);
        }
        if self.section > sec {
            return Err(Error::ErrSectionDone);
        }
        self.res_header_valid = false;
        if self.index == self.header.count(sec) as usize {
            self.index = 0;
            self.section = sec.next();
            return Err(Error::ErrSectionDone);
        }
        Ok(())
    }

    fn resource(&mut self, sec: Section) -> Result<Resource> {
        let header = self.resource_header(sec)?;
        self.res_header_valid = false;
        let (body, off) =
            unpack_resource_body(header.typ, self.msg, self.off, header.length as usize)?;
        self.off = off;
        self.index += 1;
        Ok(Resource {
            header,
            body: Some(body),
        })
    }

    fn resource_header(&mut self, sec: Section) -> Result<ResourceHeader> {
        if self.res_header_valid {
            return Ok(self.res_header.clone());
        }
        self.check_advance(sec)?;
        let mut hdr = ResourceHeader::default();
        let off = hdr.unpack(self.msg, self.off)?;
        self.res_header_valid = true;
        self.res_header = hdr.clone();
        self.off = off;
        Ok(hdr)
    }

    fn skip_resource(&mut self, sec: Section) -> Result<()> {
        if self.res_header_valid {
            let new_off = self.off + self.res_header.length as usize;
            if new_off > self.msg.len() {
                return Err(Error::ErrResourceLen);
            }
            self.off = new_off;
            self.res_header_valid = false;
            self.index += 1;
            return Ok(());
        }
        self.check_advance(sec)?;
        self.off = Resource::skip(self.msg, self.off)?;
        self.index += 1;
        Ok(())
    }

    // question parses a single question.
    pub(crate) fn question(&mut self) -> Result<Question> {
        self.check_advance(Section::Questions)?;
        let mut name = Name::default();
        let mut off = name.unpack(self.msg, self.off)?;
        let mut typ = DnsType::default();
        off = typ.unpack(self.msg, off)?;
        let mut class = DnsClass::default();
        off = class.unpack(self.msg, off)?;
        self.off = off;
        self.index += 1;
        Ok(Question { name, typ, class })
    }

    // all_questions parses all questions in the message.
    pub(crate) fn all_questions(&mut self) -> Result<Vec<Question>> {
        let mut qs = Vec::new();
        loop {
            match self.question() {
                Ok(q) => qs.push(q),
                Err(Error::ErrSectionDone) => return Ok(qs),
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn skip_question(&mut self) -> Result<()> {
        self.check_advance(Section::Questions)?;
        let mut off = Name::skip(self.msg, self.off)?;
        off = DnsType::skip(self.msg, off)?;
        off = DnsClass::skip(self.msg, off)?;
        self.off = off;
        self.index += 1;
        Ok(())
    }

    pub(crate) fn skip_all_questions(&mut self) -> Result<()> {
        loop {
            match self.skip_question() {
                Err(Error::ErrSectionDone) => return Ok(()),
                Err(err) => return Err(err),
                Ok(_) => {}
            }
        }
    }

    // answer parses a single answer resource.
    pub(crate) fn answer(&mut self) -> Result<Resource> {
        self.resource(Section::Answers)
    }

    // answer_header parses a single answer resource header, leaving the body
    // unparsed until answer or skip_answer is called.
    pub(crate) fn answer_header(&mut self) -> Result<ResourceHeader> {
        self.resource_header(Section::Answers)
    }

    pub(crate) fn all_answers(&mut self) -> Result<Vec<Resource>> {
        let mut records = Vec::new();
        loop {
            match self.answer() {
                Ok(r) => records.push(r),
                Err(Error::ErrSectionDone) => return Ok(records),
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn skip_all_answers(&mut self) -> Result<()> {
        loop {
            match self.skip_resource(Section::Answers) {
                Err(Error::ErrSectionDone) => return Ok(()),
                Err(err) => return Err(err),
                Ok(_) => {}
            }
        }
    }

    // authority parses a single authority resource.
    pub(crate) fn authority(&mut self) -> Result<Resource> {
        self.resource(Section::Authorities)
    }

    pub(crate) fn all_authorities(&mut self) -> Result<Vec<Resource>> {
        let mut records = Vec::new();
        loop {
            match self.authority() {
                Ok(r) => records.push(r),
                Err(Error::ErrSectionDone) => return Ok(records),
                Err(err) => return Err(err),
            }
        }
    }

    pub(crate) fn skip_all_authorities(&mut self) -> Result<()> {
        loop {
            match self.skip_resource(Section::Authorities) {
                Err(Error::ErrSectionDone) => return Ok(()),
                Err(err) => return Err(err),
                Ok(_) => {}
            }
        }
    }

    // additional parses a single additional resource.
    pub(crate) fn additional(&mut self) -> Result<Resource> {
        self.resource(Section::Additionals)
    }

    pub(crate) fn all_additionals(&mut self) -> Result<Vec<Resource>> {
        let mut records = Vec::new();
        loop {
            match self.additional() {
                Ok(r) => records.push(r),
                Err(Error::ErrSectionDone) => return Ok(records),
                Err(err) => return Err(err),
            }
        }
    }
}
